//! Process-wide configuration, read once from the environment at startup.
//!
//! A `.env` file in the working directory is honoured (via `dotenvy`) but
//! real environment variables win.

use std::fmt::Display;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sandbox::{BuildSpec, SandboxConfig};

/// Extensions accepted for upload (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Default name:tag of the sandbox image.
pub const DEFAULT_IMAGE: &str = "pdf-converter-isolated:latest";

const MAX_UPLOAD_MB: RangeInclusive<usize> = 1..=4096;
const TIMEOUT_SECS: RangeInclusive<u64> = 1..=86_400;
const MEMORY_MB: RangeInclusive<u64> = 6..=1_048_576;
// Docker's accepted CPU share weights.
const CPU_SHARES: RangeInclusive<u32> = 2..=262_144;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub sandbox: SandboxConfig,
    pub build: BuildSpec,
    pub jobs: JobConfig,
    pub log_format: LogFormat,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl HttpConfig {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                key: "PDF2WIKI_HOST".to_string(),
                message: e.to_string(),
            })
    }
}

/// Where per-job workspaces are created.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub workspace_root: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format '{}', expected 'pretty' or 'json'", s)),
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sandbox_defaults = SandboxConfig::default();

        let http = HttpConfig {
            host: lookup("PDF2WIKI_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PDF2WIKI_PORT", 5000)?,
            max_upload_bytes: parse_in(&lookup, "PDF2WIKI_MAX_UPLOAD_MB", 50, MAX_UPLOAD_MB)?
                * 1024
                * 1024,
        };

        let image = lookup("PDF2WIKI_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        if image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "PDF2WIKI_IMAGE".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let sandbox = SandboxConfig {
            image: image.clone(),
            timeout: Duration::from_secs(parse_in(
                &lookup,
                "PDF2WIKI_TIMEOUT_SECS",
                sandbox_defaults.timeout.as_secs(),
                TIMEOUT_SECS,
            )?),
            memory_limit_mb: parse_in(
                &lookup,
                "PDF2WIKI_MEMORY_MB",
                sandbox_defaults.memory_limit_mb,
                MEMORY_MB,
            )?,
            cpu_shares: parse_in(
                &lookup,
                "PDF2WIKI_CPU_SHARES",
                sandbox_defaults.cpu_shares,
                CPU_SHARES,
            )?,
            ..sandbox_defaults
        };

        let build = BuildSpec {
            image,
            context_dir: lookup("PDF2WIKI_BUILD_CONTEXT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            dockerfile: lookup("PDF2WIKI_DOCKERFILE")
                .unwrap_or_else(|| "docker/Dockerfile".to_string()),
        };

        let jobs = JobConfig {
            workspace_root: lookup("PDF2WIKI_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        };

        let log_format = match lookup("PDF2WIKI_LOG_FORMAT") {
            Some(v) => v.parse().map_err(|message| ConfigError::InvalidValue {
                key: "PDF2WIKI_LOG_FORMAT".to_string(),
                message,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            http,
            sandbox,
            build,
            jobs,
            log_format,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Like [`parse_or`], but the value must also fall inside `range`.
fn parse_in<T, F>(
    lookup: &F,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!(
                "{} is outside {}..={}",
                value,
                range.start(),
                range.end()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_stock_deployment() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.sandbox.image, DEFAULT_IMAGE);
        assert_eq!(config.build.image, DEFAULT_IMAGE);
        assert_eq!(config.build.dockerfile, "docker/Dockerfile");
        assert_eq!(config.http.port, 5000);
        assert_eq!(config.http.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("PDF2WIKI_PORT", "8080"),
            ("PDF2WIKI_IMAGE", "converter:v2"),
            ("PDF2WIKI_TIMEOUT_SECS", "30"),
            ("PDF2WIKI_WORKSPACE_ROOT", "/srv/jobs"),
            ("PDF2WIKI_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.sandbox.image, "converter:v2");
        assert_eq!(config.build.image, "converter:v2");
        assert_eq!(config.sandbox.timeout, Duration::from_secs(30));
        assert_eq!(config.jobs.workspace_root, PathBuf::from("/srv/jobs"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_number_is_reported_with_key() {
        let err = Config::from_lookup(lookup_from(&[("PDF2WIKI_PORT", "eighty")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "PDF2WIKI_PORT"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        for (key, value) in [
            ("PDF2WIKI_MAX_UPLOAD_MB", "18446744073709551615"),
            ("PDF2WIKI_MAX_UPLOAD_MB", "0"),
            ("PDF2WIKI_TIMEOUT_SECS", "18446744073709551615"),
            ("PDF2WIKI_TIMEOUT_SECS", "0"),
            ("PDF2WIKI_MEMORY_MB", "18446744073709551615"),
            ("PDF2WIKI_CPU_SHARES", "0"),
        ] {
            match Config::from_lookup(lookup_from(&[(key, value)])) {
                Err(ConfigError::InvalidValue { key: reported, .. }) => {
                    assert_eq!(reported, key, "{key}={value}")
                }
                other => panic!("{key}={value}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn range_bounds_are_accepted() {
        let config = Config::from_lookup(lookup_from(&[
            ("PDF2WIKI_MAX_UPLOAD_MB", "4096"),
            ("PDF2WIKI_TIMEOUT_SECS", "1"),
            ("PDF2WIKI_MEMORY_MB", "1048576"),
        ]))
        .unwrap();
        assert_eq!(config.http.max_upload_bytes, 4096 * 1024 * 1024);
        assert_eq!(config.sandbox.timeout, Duration::from_secs(1));
        assert_eq!(config.sandbox.memory_bytes(), 1 << 40);
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("PDF2WIKI_IMAGE", "  ")])).is_err());
    }

    #[test]
    fn addr_parses() {
        let config = Config::from_lookup(lookup_from(&[("PDF2WIKI_HOST", "127.0.0.1")])).unwrap();
        assert_eq!(config.http.addr().unwrap().to_string(), "127.0.0.1:5000");
    }
}
