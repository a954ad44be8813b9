//! Entry point of the sandbox image.
//!
//! Invoked by the host as `pdf2wiki-worker -- <name>.pdf`; reads and writes
//! only inside the data directory. Progress goes to stderr, failures exit 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pdf2wiki::worker::{ConversionWorker, ExternalTool};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pdf2wiki-worker", version, about = "Convert one PDF to MediaWiki markup")]
struct Args {
    /// PDF filename inside the data directory
    input: String,

    /// Directory holding the input and receiving the outputs
    #[arg(long, env = "PDF2WIKI_DATA_DIR", default_value = "/data")]
    data_dir: PathBuf,

    /// Override the PDF to Markdown command ({input} and {output} are substituted)
    #[arg(long)]
    extract_cmd: Option<String>,

    /// Override the Markdown to MediaWiki command ({input} and {output} are substituted)
    #[arg(long)]
    render_cmd: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // clap exits with 2 on usage errors.
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut worker = ConversionWorker::new(&args.data_dir);
    if let Some(cmd) = args.extract_cmd.as_deref() {
        match ExternalTool::parse(cmd) {
            Some(tool) => worker = worker.with_extractor(tool),
            None => {
                eprintln!("--extract-cmd must not be empty");
                return ExitCode::from(2);
            }
        }
    }
    if let Some(cmd) = args.render_cmd.as_deref() {
        match ExternalTool::parse(cmd) {
            Some(tool) => worker = worker.with_renderer(tool),
            None => {
                eprintln!("--render-cmd must not be empty");
                return ExitCode::from(2);
            }
        }
    }

    match worker.run(&args.input).await {
        Ok(path) => {
            tracing::info!("Conversion finished: {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
