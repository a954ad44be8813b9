//! The conversion pipeline that runs inside the sandbox.
//!
//! `name.pdf` ─▶ extraction tool ─▶ `name.md` ─▶ markup tool ─▶
//! `name_wikitext.txt`, all inside one data directory. Both steps are
//! external programs; the worker only sequences them and checks that each
//! one actually left its output behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::job::SafeFilename;

/// Extraction: PDF to Markdown through `pymupdf4llm`.
const EXTRACT_SCRIPT: &str = "import pathlib, sys, pymupdf4llm; \
pathlib.Path(sys.argv[2]).write_text(pymupdf4llm.to_markdown(sys.argv[1]), encoding='utf-8')";

/// Errors the worker reports on stderr before exiting non-zero.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid input argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("File not found inside the container at {path}. Contents of {dir}: [{}]", .contents.join(", "))]
    InputMissing {
        path: PathBuf,
        dir: PathBuf,
        contents: Vec<String>,
    },

    #[error("{step} failed: {program} {reason}")]
    ToolFailed {
        step: &'static str,
        program: String,
        reason: String,
    },

    #[error("{step} finished but {path} was not written")]
    OutputMissing { step: &'static str, path: PathBuf },
}

/// An external program with `{input}`/`{output}` placeholders in its args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalTool {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace-separated command line (no shell quoting).
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }

    /// Default PDF to Markdown extractor.
    pub fn default_extractor() -> Self {
        Self::new("python3", ["-c", EXTRACT_SCRIPT, "{input}", "{output}"])
    }

    /// Default Markdown to MediaWiki renderer.
    pub fn default_renderer() -> Self {
        Self::new(
            "pandoc",
            ["-f", "markdown", "-t", "mediawiki", "-o", "{output}", "{input}"],
        )
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    /// Run the tool, failing on spawn errors or non-zero exit.
    async fn run(
        &self,
        step: &'static str,
        input: &Path,
        output: &Path,
        cwd: &Path,
    ) -> Result<(), WorkerError> {
        let args = self.expand_args(input, output);
        tracing::debug!(step, program = %self.program, ?args, "Running tool");

        let result = Command::new(&self.program)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| WorkerError::ToolFailed {
                step,
                program: self.program.clone(),
                reason: format!("could not be started: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(step, "{}", stdout.trim_end());
        }

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(WorkerError::ToolFailed {
                step,
                program: self.program.clone(),
                reason: format!("exited with {}: {}", result.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

/// Sequences extraction and rendering for one input file.
#[derive(Debug, Clone)]
pub struct ConversionWorker {
    data_dir: PathBuf,
    extractor: ExternalTool,
    renderer: ExternalTool,
}

impl ConversionWorker {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            extractor: ExternalTool::default_extractor(),
            renderer: ExternalTool::default_renderer(),
        }
    }

    pub fn with_extractor(mut self, tool: ExternalTool) -> Self {
        self.extractor = tool;
        self
    }

    pub fn with_renderer(mut self, tool: ExternalTool) -> Self {
        self.renderer = tool;
        self
    }

    /// Convert `input` (a bare filename inside the data dir).
    ///
    /// Returns the path of the wiki markup file, which is guaranteed to exist.
    pub async fn run(&self, input: &str) -> Result<PathBuf, WorkerError> {
        let name = SafeFilename::parse(input).map_err(|e| WorkerError::InvalidArgument {
            reason: e.to_string(),
        })?;
        // The host already sanitized the name; a mismatch means a path was smuggled in.
        if name.as_str() != input {
            return Err(WorkerError::InvalidArgument {
                reason: format!("{:?} is not a plain filename", input),
            });
        }

        let pdf = name.path_in(&self.data_dir);
        if !pdf.is_file() {
            return Err(WorkerError::InputMissing {
                path: pdf,
                dir: self.data_dir.clone(),
                contents: list_dir(&self.data_dir).await,
            });
        }

        tracing::info!("Processing file: {} from {}", name, self.data_dir.display());

        let markdown = self.data_dir.join(name.markdown_name());
        self.extractor
            .run("Markdown extraction", &pdf, &markdown, &self.data_dir)
            .await?;
        require_file("Markdown extraction", &markdown)?;
        tracing::info!("Markdown file created: {}", name.markdown_name());

        let wikitext = self.data_dir.join(name.result_name());
        self.renderer
            .run("Wikitext conversion", &markdown, &wikitext, &self.data_dir)
            .await?;
        require_file("Wikitext conversion", &wikitext)?;
        tracing::info!("Wikitext file created: {}", name.result_name());

        Ok(wikitext)
    }
}

fn require_file(step: &'static str, path: &Path) -> Result<(), WorkerError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WorkerError::OutputMissing {
            step,
            path: path.to_path_buf(),
        })
    }
}

/// Sorted entry names of `dir`, for diagnostics.
async fn list_dir(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}
