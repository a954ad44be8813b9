//! One-time preparation of the sandbox image.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::ProvisionError;
use crate::sandbox::ImageStore;
use crate::sandbox::config::BuildSpec;
use crate::sandbox::error::SandboxError;

/// Makes sure the sandbox image exists before any job runs.
///
/// The first call checks for the image and builds it if absent. Its outcome
/// is remembered: later or concurrent callers wait for and share it, so at
/// most one build is ever attempted per provisioner.
pub struct EnvironmentProvisioner {
    images: Arc<dyn ImageStore>,
    spec: BuildSpec,
    outcome: OnceCell<Result<(), ProvisionError>>,
}

impl EnvironmentProvisioner {
    pub fn new(images: Arc<dyn ImageStore>, spec: BuildSpec) -> Self {
        Self {
            images,
            spec,
            outcome: OnceCell::new(),
        }
    }

    /// Ensure the image exists, building it at most once.
    pub async fn ensure_ready(&self) -> Result<(), ProvisionError> {
        self.outcome.get_or_init(|| self.provision()).await.clone()
    }

    /// Whether a previous call already succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(())))
    }

    async fn provision(&self) -> Result<(), ProvisionError> {
        let image = &self.spec.image;

        match self.images.image_exists(image).await {
            Ok(true) => {
                tracing::info!(image = %image, "Sandbox image already exists, skipping build");
                return Ok(());
            }
            Ok(false) => {
                tracing::info!(image = %image, "Sandbox image not found, building");
            }
            Err(e) => {
                tracing::error!(image = %image, "Cannot inspect sandbox image: {}", e);
                return Err(ProvisionError::PlatformUnavailable {
                    reason: e.to_string(),
                });
            }
        }

        match self.images.build_image(&self.spec).await {
            Ok(_) => {
                tracing::info!(image = %image, "Sandbox image built");
                Ok(())
            }
            Err(SandboxError::ImageBuildFailed { image, log }) => {
                Err(ProvisionError::BuildFailed { image, log })
            }
            Err(e @ SandboxError::DockerNotAvailable { .. }) => {
                Err(ProvisionError::PlatformUnavailable {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(ProvisionError::BuildFailed {
                image: image.clone(),
                log: e.to_string(),
            }),
        }
    }
}
