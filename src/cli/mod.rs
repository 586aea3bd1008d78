//! Command-line interface.

mod args;
mod commands;

pub use args::{Cli, Command, CreditsCommand, UniversalFlagArgs};
pub use commands::dispatch;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use smartspec_config::{load_from_path, load_with_discovery};
use smartspec_utils::ExitCode;
use smartspec_utils::logging::init_tracing;

use crate::orchestrator::Orchestrator;

/// Parse arguments, bootstrap the orchestrator, dispatch, shut down.
///
/// # Errors
/// Unrecoverable startup failures (the caller maps them to exit codes).
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _ = init_tracing(cli.verbose);

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let root = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow::anyhow!("working directory is not UTF-8: {}", p.display()))?;

    let config = match &cli.config {
        Some(path) => {
            let path = Utf8PathBuf::from_path_buf(path.clone())
                .map_err(|p| anyhow::anyhow!("config path is not UTF-8: {}", p.display()))?;
            load_from_path(&path)?
        }
        None => load_with_discovery(&root)?,
    };

    let orchestrator = match Orchestrator::bootstrap(config, root).await {
        Ok(orchestrator) => orchestrator,
        Err(error) => {
            eprintln!("startup failed: {}", error.display_for_user());
            return Ok(error.to_exit_code());
        }
    };

    let code = dispatch(&orchestrator, cli.command).await?;
    orchestrator.shutdown().await;
    Ok(code)
}
