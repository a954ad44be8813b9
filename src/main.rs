//! Host binary: provisions the sandbox image, then serves the web UI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pdf2wiki::config::LogFormat;
use pdf2wiki::sandbox::connect_docker;
use pdf2wiki::web::{self, AppState, WebServer};
use pdf2wiki::{
    Config, DockerImageStore, DockerSandbox, EnvironmentProvisioner, JobOrchestrator, Upload,
};

#[derive(Parser, Debug)]
#[command(name = "pdf2wiki", version, about = "Convert PDFs to MediaWiki markup in a sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the web service (default)
    Serve,

    /// Build the sandbox image if it does not exist yet
    Provision,

    /// Convert one local PDF and print the wiki text
    Convert {
        /// Path to the PDF
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let docker = connect_docker()
        .await
        .context("Docker is required to run conversions")?;

    let images = Arc::new(DockerImageStore::new(docker.clone()));
    let provisioner = EnvironmentProvisioner::new(images, config.build.clone());
    provisioner.ensure_ready().await?;

    let sandbox = Arc::new(DockerSandbox::new(docker, config.sandbox.clone()));
    let orchestrator = Arc::new(JobOrchestrator::new(sandbox, config.jobs.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, orchestrator).await,
        Command::Provision => {
            println!("Sandbox image {} is ready", config.build.image);
            Ok(())
        }
        Command::Convert { path } => convert(&orchestrator, path).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf2wiki=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn serve(config: &Config, orchestrator: Arc<JobOrchestrator>) -> anyhow::Result<()> {
    let router = web::routes(AppState { orchestrator }, config.http.max_upload_bytes);
    let mut server = WebServer::new(config.http.addr()?, router);
    server.start().await?;

    web::shutdown_signal().await;
    server.shutdown().await;
    Ok(())
}

async fn convert(orchestrator: &JobOrchestrator, path: PathBuf) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let conversion = orchestrator.handle(Upload::new(filename, bytes)).await?;
    print!("{}", conversion.wikitext);
    Ok(())
}
