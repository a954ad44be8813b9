//! Sandbox image inspection and building through the Docker API.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::image::BuildImageOptions;
use futures::StreamExt;

use crate::sandbox::ImageStore;
use crate::sandbox::config::BuildSpec;
use crate::sandbox::error::{Result, SandboxError};

/// Top-level entries of the build context never sent to the daemon.
const CONTEXT_IGNORE: &[&str] = &["target", ".git", "examples"];

/// [`ImageStore`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerImageStore {
    docker: Docker,
}

impl DockerImageStore {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ImageStore for DockerImageStore {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(SandboxError::DockerNotAvailable {
                reason: e.to_string(),
            }),
        }
    }

    async fn build_image(&self, spec: &BuildSpec) -> Result<String> {
        let context_dir = spec.context_dir.clone();
        if !context_dir.join(&spec.dockerfile).is_file() {
            return Err(SandboxError::Config {
                reason: format!(
                    "dockerfile {} not found in build context {}",
                    spec.dockerfile,
                    context_dir.display()
                ),
            });
        }

        let context = tokio::task::spawn_blocking(move || pack_context(&context_dir))
            .await
            .map_err(|e| SandboxError::Io(io::Error::other(e)))??;

        tracing::info!(
            image = %spec.image,
            context_bytes = context.len(),
            "Building sandbox image"
        );

        let options = BuildImageOptions {
            dockerfile: spec.dockerfile.clone(),
            t: spec.image.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(bytes::Bytes::from(context)));

        let mut log = String::new();
        let mut failure: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        let trimmed = line.trim_end();
                        if !trimmed.is_empty() {
                            tracing::debug!("build: {}", trimmed);
                        }
                        log.push_str(&line);
                    }
                    if let Some(error) = info.error {
                        log.push_str(&error);
                        log.push('\n');
                        failure = Some(error);
                    }
                }
                Err(e) => {
                    log.push_str(&e.to_string());
                    log.push('\n');
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = failure {
            tracing::error!(image = %spec.image, "Image build failed: {}", reason);
            return Err(SandboxError::ImageBuildFailed {
                image: spec.image.clone(),
                log,
            });
        }

        Ok(log)
    }
}

/// Tar up the build context in memory, skipping [`CONTEXT_IGNORE`].
fn pack_context(dir: &Path) -> io::Result<Vec<u8>> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);

    for entry in entries {
        let name = entry.file_name();
        if CONTEXT_IGNORE.iter().any(|ignored| name.to_str() == Some(*ignored)) {
            continue;
        }

        let path = entry.path();
        if entry.file_type()?.is_dir() {
            archive.append_dir_all(&name, &path)?;
        } else {
            archive.append_path_with_name(&path, &name)?;
        }
    }

    archive.into_inner()
}
