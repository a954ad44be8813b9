//! Request-level job handling.
//!
//! ```text
//! Upload ─▶ SafeFilename::parse ─▶ Workspace::create ─▶ write input
//!                                        │
//!                                        ▼
//!                                SandboxRunner::run
//!                                        │
//!                                        ▼
//!                        read {base}_wikitext.txt ─▶ Workspace::destroy
//! ```
//!
//! Validation happens before any directory exists. Once the workspace is
//! created it is destroyed on every path out of [`JobOrchestrator::handle`];
//! if the future is dropped mid-flight the workspace's `Drop` removes it.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::JobConfig;
use crate::error::JobError;
use crate::job::filename::SafeFilename;
use crate::job::workspace::Workspace;
use crate::sandbox::SandboxRunner;

/// An uploaded file as received from the client.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Client-supplied filename; `None` if the file field was absent.
    pub filename: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: Some(filename.into()),
            bytes: bytes.into(),
        }
    }
}

/// A successful conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// The sanitized input name the job ran under.
    pub input: SafeFilename,
    /// Contents of `{base}_wikitext.txt`.
    pub wikitext: String,
}

impl Conversion {
    pub fn result_name(&self) -> String {
        self.input.result_name()
    }
}

/// Runs conversion jobs end to end.
///
/// Holds no per-job state; any number of `handle` calls may run at once.
pub struct JobOrchestrator {
    sandbox: Arc<dyn SandboxRunner>,
    workspace_root: PathBuf,
}

impl JobOrchestrator {
    pub fn new(sandbox: Arc<dyn SandboxRunner>, config: JobConfig) -> Self {
        Self {
            sandbox,
            workspace_root: config.workspace_root,
        }
    }

    /// Convert one upload to wiki markup.
    pub async fn handle(&self, upload: Upload) -> Result<Conversion, JobError> {
        let raw = upload
            .filename
            .as_deref()
            .ok_or_else(|| JobError::invalid_input("No file part in the request."))?;
        let input = SafeFilename::parse(raw)?;
        if upload.bytes.is_empty() {
            return Err(JobError::invalid_input("The uploaded file is empty."));
        }

        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("job", job_id = %job_id, input = %input);

        self.execute(input, upload.bytes).instrument(span).await
    }

    async fn execute(&self, input: SafeFilename, bytes: Bytes) -> Result<Conversion, JobError> {
        let workspace = Workspace::create(&self.workspace_root).await?;
        tracing::debug!(workspace = %workspace.path().display(), "Created workspace");

        let result = self.run_in(&workspace, &input, &bytes).await;
        workspace.destroy();

        match &result {
            Ok(_) => tracing::info!("Conversion succeeded"),
            Err(e @ JobError::ResultMissing { .. }) => {
                tracing::error!(kind = e.kind(), "Worker broke its output contract: {}", e)
            }
            Err(e @ JobError::SandboxUnavailable { .. }) => {
                tracing::error!(kind = e.kind(), "{}", e)
            }
            Err(e) => tracing::warn!(kind = e.kind(), "{}", e),
        }

        result.map(|wikitext| Conversion { input, wikitext })
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        input: &SafeFilename,
        bytes: &[u8],
    ) -> Result<String, JobError> {
        workspace.write_input(input, bytes).await?;

        let output = self.sandbox.run(workspace.path(), input).await?;
        tracing::debug!(
            duration_ms = output.duration.as_millis() as u64,
            truncated = output.truncated,
            "Sandbox run finished"
        );

        workspace
            .read_result(input)
            .await?
            .ok_or_else(|| JobError::ResultMissing {
                expected: input.result_name(),
            })
    }
}
