//! Error types for the Docker execution sandbox.

use std::time::Duration;

/// Errors that can occur in the sandbox system.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Docker daemon is not available or not running.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable { reason: String },

    /// Failed to create container (missing image, daemon refused, ...).
    #[error("Container creation failed: {reason}")]
    ContainerCreationFailed { reason: String },

    /// Failed to start container.
    #[error("Container start failed: {reason}")]
    ContainerStartFailed { reason: String },

    /// Waiting on the container failed.
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The worker ran and exited non-zero.
    #[error("Worker exited with code {exit_code}")]
    WorkerFailed {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },

    /// Worker exceeded the time bound; the container was force-removed.
    #[error("Worker timed out after {0:?}")]
    Timeout(Duration),

    /// Building the sandbox image failed.
    #[error("Image build failed for {image}")]
    ImageBuildFailed { image: String, log: String },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl SandboxError {
    /// Human-readable diagnostic, preferring the worker's error stream.
    ///
    /// Never empty.
    pub fn diagnostic(&self) -> String {
        match self {
            SandboxError::WorkerFailed {
                exit_code,
                stdout,
                stderr,
            } => {
                let stderr = stderr.trim();
                let stdout = stdout.trim();
                if !stderr.is_empty() {
                    stderr.to_string()
                } else if !stdout.is_empty() {
                    stdout.to_string()
                } else {
                    format!("worker exited with code {} and no output", exit_code)
                }
            }
            SandboxError::ImageBuildFailed { image, log } if !log.trim().is_empty() => {
                format!("image build failed for {}:\n{}", image, log.trim_end())
            }
            other => other.to_string(),
        }
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
