//! Subscriber setup: console plus a plain-text log file.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `galleria_<command>_<YYYYmmdd_HHMMSS>.log` in the working directory.
pub fn default_log_file(command: &str) -> PathBuf {
    PathBuf::from(format!(
        "galleria_{}_{}.log",
        command,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Install the process-wide subscriber. Call once, before any work.
///
/// `RUST_LOG` overrides the level chosen by `debug`.
pub fn init(debug: bool, log_file: &Path) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
