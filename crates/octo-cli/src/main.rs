mod cli;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use octo_core::services::config_loader;
use octo_core::Orchestrator;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let _guard = setup_logging(cli.log_file.as_deref());

    let config = match &cli.config {
        Some(path) => config_loader::load(path)?,
        None => config_loader::load_or_default(&std::env::current_dir()?)?,
    };
    tracing::debug!(?config, "configuration loaded");

    let orchestrator = Orchestrator::new(config, usize::from(cli.instances))?;
    orchestrator.run_until(interrupted()).await?;
    Ok(())
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

/// Configure tracing to stderr, or to `log_file` when given.
/// Returns the guard that must be held alive for the duration of the program.
fn setup_logging(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path.file_name().unwrap_or(path.as_os_str());
    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
