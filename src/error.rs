//! Error types for the conversion service.
//!
//! Per-request failures are [`JobError`]s and never escape the orchestrator
//! before the job's workspace is deleted. [`ProvisionError`] only happens at
//! startup and stops the process before it serves anything.

use std::time::Duration;

use crate::sandbox::SandboxError;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Outcome of a failed conversion job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Missing upload, empty filename or an extension outside the allowed set.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The container platform could not create an instance.
    #[error("Sandbox unavailable: {reason}")]
    SandboxUnavailable { reason: String },

    /// The worker exited non-zero or the instance could not be started.
    #[error("Conversion failed: {diagnostic}")]
    ConversionFailed { diagnostic: String },

    /// The worker exited zero but did not write the result file.
    #[error("Conversion reported success but {expected} was not produced")]
    ResultMissing { expected: String },

    /// The worker exceeded the configured time bound and was killed.
    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    /// Host-side failure unrelated to the sandbox (disk full, bad UTF-8...).
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl JobError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::SandboxUnavailable { .. } => "sandbox_unavailable",
            Self::ConversionFailed { .. } => "conversion_failed",
            Self::ResultMissing { .. } => "result_missing",
            Self::Timeout(_) => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<SandboxError> for JobError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::DockerNotAvailable { reason }
            | SandboxError::ContainerCreationFailed { reason } => {
                Self::SandboxUnavailable { reason }
            }
            SandboxError::ContainerStartFailed { reason }
            | SandboxError::ExecutionFailed { reason } => Self::ConversionFailed { diagnostic: reason },
            SandboxError::WorkerFailed { .. } => Self::ConversionFailed {
                diagnostic: e.diagnostic(),
            },
            SandboxError::Timeout(d) => Self::Timeout(d),
            SandboxError::Docker(e) => Self::SandboxUnavailable {
                reason: e.to_string(),
            },
            SandboxError::ImageBuildFailed { .. } | SandboxError::Config { .. } => {
                Self::SandboxUnavailable {
                    reason: e.to_string(),
                }
            }
            SandboxError::Io(e) => Self::Internal {
                reason: e.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal {
            reason: e.to_string(),
        }
    }
}

/// The sandbox image could not be made ready; the process must not serve.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionError {
    #[error("Container platform unavailable: {reason}")]
    PlatformUnavailable { reason: String },

    #[error("Failed to build image {image}:\n{log}")]
    BuildFailed { image: String, log: String },
}

/// HTTP listener errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
}
