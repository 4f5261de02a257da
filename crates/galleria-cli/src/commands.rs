//! One function per subcommand.
//!
//! Every mutating command runs a dry run first. With `--commit` it then
//! counts down (Ctrl+C aborts) and runs again for real.

use crate::cli::CommitArgs;
use anyhow::{bail, Result};
use galleria_core::config::EngineConfig;
use galleria_core::{
    remove_empty_directories, CancellationToken, Classification, DirectoryMatch, ExecutionMode,
    Galleria, LayoutConvention, MigrationPlan, ReconciliationReport,
};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn validate(engine: &Galleria, report_path: &Path) -> Result<()> {
    let report = engine.validate()?;
    for class in Classification::ALL {
        info!("{}: {}", class, report.count(class));
    }
    info!(
        "Orphan files: {}, orphan directories: {}, self-reference warnings: {}",
        report.orphan_files.len(),
        report.orphan_directories.len(),
        report.self_reference_violations.len()
    );
    report.write(report_path)?;
    info!("Validation result written to {}", report_path.display());
    Ok(())
}

pub fn cleanup(
    engine: &Galleria,
    report_path: &Path,
    commit: CommitArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let report = ReconciliationReport::read(report_path)?;
    info!("Loaded validation result from {}", report_path.display());

    info!("Running in DRY RUN mode to check the cleanup");
    engine.cleanup(&report, ExecutionMode::DryRun, cancel)?;
    if !confirm(commit, cancel)? {
        return Ok(());
    }

    let summary = engine.cleanup(&report, ExecutionMode::Commit, cancel)?;
    info!(
        "Removed {} orphan files, {} orphan directories, {} incomplete downloads, {} empty directories",
        summary.orphan_files,
        summary.orphan_directories,
        summary.purged_artifacts.len(),
        summary.empty_directories
    );
    Ok(())
}

pub fn migrate(
    engine: &Galleria,
    from: LayoutConvention,
    to: LayoutConvention,
    commit: CommitArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let plan = engine.plan_migration(from, to)?;
    run_plan(engine, &plan, commit, cancel)
}

pub fn rewrite_extensions(
    engine: &Galleria,
    commit: CommitArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let plan = engine.plan_extension_rewrite()?;
    run_plan(engine, &plan, commit, cancel)
}

pub fn remove_empty_dirs(root: &Path, commit: CommitArgs, cancel: &CancellationToken) -> Result<()> {
    let log = remove_empty_directories(root, ExecutionMode::DryRun)?;
    info!("{} empty directories found", log.len());
    if log.is_empty() || !confirm(commit, cancel)? {
        return Ok(());
    }
    let log = remove_empty_directories(root, ExecutionMode::Commit)?;
    info!("Removed {} empty directories", log.len());
    Ok(())
}

pub fn verify(engine: &Galleria) -> Result<()> {
    let report = engine.verify()?;
    if !report.is_ok() {
        bail!(
            "Verification failed with {} errors (artifacts: {:?})",
            report.error_count(),
            report.failed_artifacts()
        );
    }
    Ok(())
}

fn run_plan(
    engine: &Galleria,
    plan: &MigrationPlan,
    commit: CommitArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    if plan.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }

    info!("Running in DRY RUN mode to verify the migration plan");
    engine.execute(plan, ExecutionMode::DryRun, cancel)?;
    if !confirm(commit, cancel)? {
        return Ok(());
    }

    info!("!!!PERFORMING MIGRATION!!!");
    if let Err(e) = engine.execute(plan, ExecutionMode::Commit, cancel) {
        error!("Migration stopped: {}", e);
        warn!("Run verify to find artifacts left mid-migration");
        return Err(e.into());
    }
    verify(engine)
}

/// Whether to go on with a commit run after the dry run.
fn confirm(commit: CommitArgs, cancel: &CancellationToken) -> Result<bool> {
    if commit.mode().is_dry_run() {
        info!("Dry run completed. Use --commit to perform the changes.");
        return Ok(false);
    }
    countdown(Duration::from_secs(commit.countdown_secs), cancel)?;
    Ok(true)
}

fn countdown(length: Duration, cancel: &CancellationToken) -> Result<()> {
    let tick = EngineConfig::COUNTDOWN_TICK;
    let mut remaining = length;
    let mut stderr = std::io::stderr();

    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            break;
        }
        write!(
            stderr,
            "\rWARNING: THIS WILL MODIFY THE CATALOG AND FILES. YOU HAVE {} SECONDS TO CANCEL.",
            remaining.as_secs()
        )?;
        stderr.flush()?;
        let step = tick.min(remaining);
        std::thread::sleep(step);
        remaining -= step;
    }
    writeln!(stderr)?;

    if cancel.is_cancelled() {
        bail!("Cancelled before any change was made");
    }
    Ok(())
}

pub fn directory_match(substring: bool) -> DirectoryMatch {
    if substring {
        DirectoryMatch::Substring
    } else {
        DirectoryMatch::Exact
    }
}
