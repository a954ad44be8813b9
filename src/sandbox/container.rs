//! Docker container lifecycle for one conversion job.
//!
//! # Container Setup
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                     Job container (pdf2wiki-<uuid>)                     │
//! │                                                                         │
//! │  Command:  pdf2wiki-worker <input.pdf>        (image ENTRYPOINT)        │
//! │                                                                         │
//! │  Mounts:                                                                │
//! │    /data ─▶ host job workspace (rw), nothing else                       │
//! │    /tmp  ─▶ tmpfs                                                       │
//! │                                                                         │
//! │  Limits:                                                                │
//! │    Memory / CPU shares from config                                      │
//! │    No network, all capabilities dropped, no-new-privileges              │
//! │    Read-only root filesystem                                            │
//! │    Runs as the workspace owner's uid:gid                                │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures::StreamExt;
use uuid::Uuid;

use crate::job::SafeFilename;
use crate::sandbox::config::{JOB_LABEL, MOUNT_POINT, SandboxConfig};
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::{SandboxOutput, SandboxRunner};

/// Slack on top of the job timeout for the Docker client's own request timeout.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Runs each job in its own throwaway container.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerSandbox {
    /// Create a sandbox runner on an existing Docker handle.
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        // bollard's default 120s request timeout would cut long waits short.
        let docker = docker.with_timeout(config.timeout.saturating_add(CLIENT_TIMEOUT_SLACK));
        Self { docker, config }
    }

    /// Container configuration for one worker run.
    fn container_config(
        &self,
        workspace: &Path,
        input: &SafeFilename,
        job_id: Uuid,
    ) -> Config<String> {
        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}:rw",
                workspace.display(),
                MOUNT_POINT
            )]),
            memory: Some(self.config.memory_bytes()),
            cpu_shares: Some(self.config.cpu_shares as i64),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            readonly_rootfs: Some(true),
            tmpfs: Some(
                [("/tmp".to_string(), self.config.tmpfs_size.clone())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };

        Config {
            image: Some(self.config.image.clone()),
            // `--` keeps names like `-draft.pdf` from being read as options.
            cmd: Some(vec!["--".to_string(), input.as_str().to_string()]),
            working_dir: Some(MOUNT_POINT.to_string()),
            // Tools in the image expect a writable HOME for caches.
            env: Some(vec!["HOME=/tmp".to_string()]),
            user: workspace_owner(workspace),
            labels: Some(HashMap::from([(JOB_LABEL.to_string(), job_id.to_string())])),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn create_container(
        &self,
        workspace: &Path,
        input: &SafeFilename,
        job_id: Uuid,
    ) -> Result<String> {
        let options = CreateContainerOptions {
            name: format!("pdf2wiki-{}", job_id),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), self.container_config(workspace, input, job_id))
            .await
            .map_err(|e| SandboxError::ContainerCreationFailed {
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %response.id, "Docker warning: {}", warning);
        }

        Ok(response.id)
    }

    /// Start the container and wait for it to exit, returning the exit code.
    async fn start_and_wait(&self, container_id: &str) -> Result<i64> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::ContainerStartFailed {
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(self.config.timeout, self.wait_for_container(container_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Timeout(self.config.timeout)),
        }
    }

    async fn wait_for_container(&self, container_id: &str) -> Result<i64> {
        let mut wait_stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::ExecutionFailed {
                reason: format!("wait failed: {}", e),
            }),
            None => Err(SandboxError::ExecutionFailed {
                reason: "container wait stream ended unexpectedly".to_string(),
            }),
        }
    }

    /// Collect stdout and stderr from a stopped container.
    async fn collect_logs(&self, container_id: &str) -> (String, String, bool) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));

        let cap = self.config.max_output_bytes;
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut truncated = false;

        while let Some(result) = stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message }) => {
                    truncated |= push_capped(&mut stdout, &String::from_utf8_lossy(&message), cap);
                }
                Ok(LogOutput::StdErr { message }) => {
                    truncated |= push_capped(&mut stderr, &String::from_utf8_lossy(&message), cap);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(container = %container_id, "Error reading container logs: {}", e);
                    break;
                }
            }
        }

        (stdout, stderr, truncated)
    }

    /// Force-remove a container. Already-gone containers are not an error.
    pub async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_already_gone(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SandboxRunner for DockerSandbox {
    async fn run(&self, workspace: &Path, input: &SafeFilename) -> Result<SandboxOutput> {
        let start_time = Instant::now();
        let job_id = Uuid::new_v4();

        let container_id = self.create_container(workspace, input, job_id).await?;
        tracing::debug!(
            container = %container_id,
            workspace = %workspace.display(),
            input = %input,
            "Container created"
        );

        let result = match self.start_and_wait(&container_id).await {
            Ok(exit_code) => {
                let (stdout, stderr, truncated) = self.collect_logs(&container_id).await;
                Ok(SandboxOutput {
                    exit_code,
                    stdout,
                    stderr,
                    duration: start_time.elapsed(),
                    truncated,
                })
            }
            Err(e) => Err(e),
        };

        // Always clean up the container
        if let Err(e) = self.remove_container(&container_id).await {
            tracing::error!(
                container = %container_id,
                job_id = %job_id,
                label = %format!("{}={}", JOB_LABEL, job_id),
                "Failed to remove container, it must be reaped by label: {}",
                e
            );
        }

        let output = result?;
        tracing::debug!(
            container = %container_id,
            exit_code = output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            "Container finished"
        );

        if output.exit_code != 0 {
            return Err(SandboxError::WorkerFailed {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}

/// 404: already gone; 409: removal already in progress.
fn is_already_gone(error: &bollard::errors::Error) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 409,
            ..
        }
    )
}

/// Append `text` to `buf` without growing past `cap` bytes.
///
/// Cuts on a char boundary. Returns true if anything was dropped.
fn push_capped(buf: &mut String, text: &str, cap: usize) -> bool {
    let remaining = cap.saturating_sub(buf.len());
    if text.len() <= remaining {
        buf.push_str(text);
        return false;
    }
    let mut end = remaining;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    buf.push_str(&text[..end]);
    true
}

/// `uid:gid` of the workspace directory, so the worker can write into it.
#[cfg(unix)]
fn workspace_owner(path: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    std::fs::metadata(path)
        .ok()
        .map(|m| format!("{}:{}", m.uid(), m.gid()))
}

#[cfg(not(unix))]
fn workspace_owner(_path: &Path) -> Option<String> {
    None
}

/// Connect to the Docker daemon.
///
/// Tries these locations in order:
/// 1. `DOCKER_HOST` env var (bollard default)
/// 2. `/var/run/docker.sock` (Linux default)
/// 3. `~/.docker/run/docker.sock` (Docker Desktop on macOS)
pub async fn connect_docker() -> Result<Docker> {
    // First try bollard defaults (checks DOCKER_HOST, then /var/run/docker.sock)
    let last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    // Try Docker Desktop socket (macOS)
    if let Some(home) = std::env::var_os("HOME") {
        let desktop_sock = Path::new(&home).join(".docker/run/docker.sock");
        if desktop_sock.exists() {
            let sock_str = desktop_sock.to_string_lossy();
            if let Ok(docker) =
                Docker::connect_with_socket(&sock_str, 120, bollard::API_DEFAULT_VERSION)
                && docker.ping().await.is_ok()
            {
                return Ok(docker);
            }
        }
    }

    Err(SandboxError::DockerNotAvailable { reason: last_error })
}
