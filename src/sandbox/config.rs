//! Configuration for the Docker execution sandbox.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_IMAGE;

/// Fixed path inside every container where the job workspace is bound.
pub const MOUNT_POINT: &str = "/data";

/// Label put on every job container, value is the job id.
pub const JOB_LABEL: &str = "pdf2wiki.job";

/// Configuration for running job containers.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Image (name:tag) every job container is created from.
    pub image: String,
    /// Hard bound on one worker run, after which the container is killed.
    pub timeout: Duration,
    /// Memory limit in megabytes.
    pub memory_limit_mb: u64,
    /// CPU shares (relative weight, default 1024).
    pub cpu_shares: u32,
    /// Size of the in-container `/tmp` tmpfs.
    pub tmpfs_size: String,
    /// Cap on captured log bytes, per stream.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            timeout: Duration::from_secs(300),
            memory_limit_mb: 1024,
            cpu_shares: 1024,
            tmpfs_size: "size=256M".to_string(),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Memory limit in bytes, saturating at `i64::MAX`.
    pub fn memory_bytes(&self) -> i64 {
        let bytes = self.memory_limit_mb.saturating_mul(1024 * 1024);
        i64::try_from(bytes).unwrap_or(i64::MAX)
    }
}

/// How to build the sandbox image when it is missing.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Tag given to the built image.
    pub image: String,
    /// Directory sent to the daemon as build context.
    pub context_dir: PathBuf,
    /// Dockerfile path, relative to `context_dir`.
    pub dockerfile: String,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            context_dir: PathBuf::from("."),
            dockerfile: "docker/Dockerfile".to_string(),
        }
    }
}
