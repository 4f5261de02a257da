//! Galleria - command-line front end for the catalog reconciliation engine.
//!
//! Dry run is always the default. Destructive commands need `--commit` and
//! wait through a countdown that Ctrl+C cancels.

mod cli;
mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use galleria_core::{CancellationToken, Galleria};
use tracing::{error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| logging::default_log_file(cli.command.name()));
    logging::init(cli.debug, &log_file)?;

    info!("Galleria v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Catalog: {}, storage root: {}, log: {}",
        cli.database.display(),
        cli.root_dir.display(),
        log_file.display()
    );

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Cancellation requested, stopping at the next artifact boundary");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let result = run(&cli, &cancel);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn run(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    if let Command::RemoveEmptyDirs { commit } = &cli.command {
        return commands::remove_empty_dirs(&cli.root_dir, *commit, cancel);
    }

    let mut builder = Galleria::builder(&cli.database, &cli.root_dir)
        .artifact_dir_prefix(cli.artifact_dir_prefix.clone());
    if let Command::Validate {
        substring_dir_match,
        skip_archive_listing,
        ..
    } = &cli.command
    {
        builder = builder
            .directory_match(commands::directory_match(*substring_dir_match))
            .list_archives(!skip_archive_listing);
    }
    let engine = builder.build()?;

    match &cli.command {
        Command::Validate { report, .. } => commands::validate(&engine, report),
        Command::Cleanup { report, commit } => commands::cleanup(&engine, report, *commit, cancel),
        Command::Migrate { from, to, commit } => {
            commands::migrate(&engine, (*from).into(), (*to).into(), *commit, cancel)
        }
        Command::RewriteExtensions { commit } => {
            commands::rewrite_extensions(&engine, *commit, cancel)
        }
        Command::Verify => commands::verify(&engine),
        Command::RemoveEmptyDirs { .. } => Ok(()),
    }
}
