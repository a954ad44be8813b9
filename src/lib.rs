//! PDF to MediaWiki conversion service.
//!
//! Every upload becomes a [`job`]: a fresh workspace directory on the host,
//! one disposable Docker container bound to it, and a worker inside that
//! container that turns `name.pdf` into `name.md` and then
//! `name_wikitext.txt`. The host reads the result back and the workspace is
//! gone before the request returns.
//!
//! ```text
//! client ──▶ web ──▶ JobOrchestrator ──▶ Workspace (temp dir + upload)
//!                          │
//!                          ▼
//!                    SandboxRunner ──▶ container ──▶ pdf2wiki-worker
//!                          │                              │
//!                          ◀──── name_wikitext.txt ◀──────┘
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod sandbox;
pub mod web;
pub mod worker;

pub use config::Config;
pub use error::{ConfigError, JobError, ProvisionError, ServerError};
pub use job::{JobOrchestrator, SafeFilename, Upload};
pub use sandbox::{
    DockerImageStore, DockerSandbox, EnvironmentProvisioner, ImageStore, SandboxRunner,
};
