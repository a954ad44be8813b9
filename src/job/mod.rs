//! Conversion jobs: one upload, one workspace, one sandbox run.

mod filename;
mod orchestrator;
mod workspace;

pub use filename::SafeFilename;
pub use orchestrator::{Conversion, JobOrchestrator, Upload};
