//! Corrective cleanup driven by a reconciliation report.
//!
//! Order of work:
//!
//! 1. every orphan listed in the report must still exist, otherwise nothing
//!    is deleted and the run fails with [`GalleriaError::StaleReport`]
//! 2. orphan files, then orphan directories, are removed
//! 3. incomplete downloads (`MASTER_UNREACHABLE`,
//!    `PAGES_INCOMPLETE_MASTER_REACHABLE`) lose their files and their
//!    catalog rows, one artifact at a time
//! 4. empty directories left behind are removed bottom-up
//!
//! `NO_OWNER` and `NO_PATH` artifacts are reported only.

use crate::archive::holds_pages;
use crate::cancel::CancellationToken;
use crate::canonical::PathCanonicalizer;
use crate::catalog::CatalogStore;
use crate::config::LayoutConfig;
use crate::execution::{ExecutionLog, ExecutionMode};
use crate::report::ReconciliationReport;
use crate::{GalleriaError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

/// What a cleanup run removed (or would remove).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub orphan_files: usize,
    pub orphan_directories: usize,
    pub purged_artifacts: Vec<i64>,
    pub empty_directories: usize,
    pub log: ExecutionLog,
}

pub struct Cleaner<'a> {
    catalog: &'a CatalogStore,
    layout: LayoutConfig,
    canonicalizer: PathCanonicalizer,
}

impl<'a> Cleaner<'a> {
    pub fn new(
        catalog: &'a CatalogStore,
        layout: LayoutConfig,
        canonicalizer: PathCanonicalizer,
    ) -> Self {
        Self {
            catalog,
            layout,
            canonicalizer,
        }
    }

    pub fn run(
        &self,
        report: &ReconciliationReport,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<CleanupSummary> {
        check_not_stale(report)?;
        cancel.check()?;

        let mut log = ExecutionLog::new(mode);
        // Paths already removed (or that would be) by earlier steps.
        let mut removed: BTreeSet<PathBuf> = BTreeSet::new();

        info!("Cleaning up {} orphan files", report.orphan_files.len());
        for file in &report.orphan_files {
            if !mode.is_dry_run() {
                fs::remove_file(file).map_err(|e| GalleriaError::io_with_path(e, file))?;
            }
            log.record_global(format!("remove orphan file {}", file.display()));
            removed.insert(file.clone());
        }

        info!(
            "Cleaning up {} orphan directories",
            report.orphan_directories.len()
        );
        for dir in &report.orphan_directories {
            if !mode.is_dry_run() {
                fs::remove_dir_all(dir).map_err(|e| GalleriaError::io_with_path(e, dir))?;
            }
            log.record_global(format!("remove orphan directory {}", dir.display()));
            removed.insert(dir.clone());
        }

        let incomplete = report.incomplete_downloads();
        info!("Purging {} incomplete downloads", incomplete.len());
        let mut purged_artifacts = Vec::with_capacity(incomplete.len());
        for artifact_id in incomplete {
            if cancel.check().is_err() {
                info!("Cancelled before purging artifact {}", artifact_id);
                return Err(GalleriaError::Cancelled);
            }
            if self.purge(artifact_id, mode, &mut log, &mut removed)? {
                purged_artifacts.push(artifact_id);
            }
        }

        info!("Cleaning up empty directories");
        let before = log.len();
        remove_empty_directories_into(&self.layout.root, mode, &removed, &mut log)?;
        let empty_directories = log.len() - before;

        Ok(CleanupSummary {
            orphan_files: report.orphan_files.len(),
            orphan_directories: report.orphan_directories.len(),
            purged_artifacts,
            empty_directories,
            log,
        })
    }

    /// Remove an artifact's files and rows. Returns false if the master row
    /// is already gone.
    fn purge(
        &self,
        artifact_id: i64,
        mode: ExecutionMode,
        log: &mut ExecutionLog,
        removed: &mut BTreeSet<PathBuf>,
    ) -> Result<bool> {
        let Some(master) = self.catalog.master(artifact_id)? else {
            info!("[{}] master record already removed, skipping", artifact_id);
            return Ok(false);
        };
        let pages = self.catalog.pages(artifact_id)?;

        let resolve_file = |recorded: &str| {
            self.canonicalizer
                .resolve(&self.layout.resolve(recorded), |c| c.is_file())
        };
        let master_file = master.path().and_then(resolve_file);
        let stored_as_archive = match (&master_file, master.path()) {
            (Some(file), Some(recorded)) => holds_pages(
                file,
                recorded,
                pages.iter().filter_map(|p| p.path()),
                |page| resolve_file(page).is_some(),
            ),
            _ => false,
        };

        let mut files = BTreeSet::new();
        // Archive pages are member names, not paths on disk.
        if !stored_as_archive {
            for path in pages.iter().filter_map(|p| p.path()) {
                for candidate in self.canonicalizer.candidates(&self.layout.resolve(path)) {
                    if candidate.is_file() {
                        files.insert(candidate);
                    }
                }
            }
        }
        if let Some(master_file) = master_file {
            files.insert(master_file);
        }

        for file in &files {
            if !mode.is_dry_run() {
                fs::remove_file(file).map_err(|e| GalleriaError::io_with_path(e, file))?;
            }
            log.record(artifact_id, format!("delete file {}", file.display()));
            removed.insert(file.clone());
        }

        if !mode.is_dry_run() {
            let counts = self.catalog.purge_artifact(artifact_id)?;
            info!(
                "[{}] removed {} page rows, {} tag links",
                artifact_id, counts.pages, counts.tag_links
            );
        }
        log.record(artifact_id, "delete catalog records");
        Ok(true)
    }
}

/// Every listed orphan must still be on disk before anything is deleted.
fn check_not_stale(report: &ReconciliationReport) -> Result<()> {
    for path in report.orphan_files.iter().chain(&report.orphan_directories) {
        if fs::symlink_metadata(path).is_err() {
            error!("Report entry no longer exists: {}", path.display());
            return Err(GalleriaError::StaleReport { path: path.clone() });
        }
    }
    Ok(())
}

/// Remove every empty directory under `root`, bottom-up, never `root` itself.
///
/// A directory that only contained empty directories is removed as well.
pub fn remove_empty_directories(root: &Path, mode: ExecutionMode) -> Result<ExecutionLog> {
    if !root.is_dir() {
        return Err(GalleriaError::Config {
            message: format!("Storage root is not a directory: {}", root.display()),
        });
    }
    let mut log = ExecutionLog::new(mode);
    remove_empty_directories_into(root, mode, &BTreeSet::new(), &mut log)?;
    Ok(log)
}

fn remove_empty_directories_into(
    root: &Path,
    mode: ExecutionMode,
    already_removed: &BTreeSet<PathBuf>,
    log: &mut ExecutionLog,
) -> Result<()> {
    let mut removed: BTreeSet<PathBuf> = already_removed.clone();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            // Removed as part of an orphan directory during this run.
            Err(e) if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if removed.contains(dir) || is_removed_below(dir, already_removed) {
            continue;
        }

        let mut empty = true;
        for child in fs::read_dir(dir).map_err(|e| GalleriaError::io_with_path(e, dir))? {
            let child = child.map_err(|e| GalleriaError::io_with_path(e, dir))?;
            if !removed.contains(&child.path()) {
                empty = false;
                break;
            }
        }
        if !empty {
            continue;
        }

        if !mode.is_dry_run() {
            fs::remove_dir(dir).map_err(|e| GalleriaError::io_with_path(e, dir))?;
        }
        log.record_global(format!("remove empty directory {}", dir.display()));
        removed.insert(dir.to_path_buf());
    }
    Ok(())
}

/// Whether `path` lies inside a directory already removed this run.
fn is_removed_below(path: &Path, removed: &BTreeSet<PathBuf>) -> bool {
    path.ancestors().skip(1).any(|a| removed.contains(a))
}
