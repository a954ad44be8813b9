//! Isolated execution of the conversion worker.
//!
//! Two seams, each with a Docker implementation:
//!
//! * [`SandboxRunner`] runs the worker once, in a fresh container bound to a
//!   job workspace, and removes that container before returning.
//! * [`ImageStore`] answers whether the sandbox image exists and builds it;
//!   [`EnvironmentProvisioner`] drives it once per process.
//!
//! The `bollard::Docker` handle is created by the caller (see
//! [`connect_docker`]) and handed to both implementations.

mod config;
mod container;
mod error;
mod image;
mod provision;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use config::{BuildSpec, JOB_LABEL, MOUNT_POINT, SandboxConfig};
pub use container::{DockerSandbox, connect_docker};
pub use error::{Result, SandboxError};
pub use image::DockerImageStore;
pub use provision::EnvironmentProvisioner;

use crate::job::SafeFilename;

/// What the worker printed and how long it took.
#[derive(Debug, Clone, Default)]
pub struct SandboxOutput {
    /// Exit code of the worker process.
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Whether either stream hit the capture cap.
    pub truncated: bool,
}

/// Runs the conversion worker against one workspace.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Run the worker on `input`, which already exists inside `workspace`.
    ///
    /// Returns only after the instance is gone. A non-zero exit is
    /// [`SandboxError::WorkerFailed`].
    async fn run(&self, workspace: &Path, input: &SafeFilename) -> Result<SandboxOutput>;
}

/// Checks for and builds the sandbox image.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Build `spec.image`, returning the build log.
    async fn build_image(&self, spec: &BuildSpec) -> Result<String>;
}
