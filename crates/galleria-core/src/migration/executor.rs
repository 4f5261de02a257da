//! Applies a [`MigrationPlan`] in dry-run or commit mode.

use super::{MigrationPlan, Operation, OperationGroup};
use crate::archive::create_archive;
use crate::cancel::CancellationToken;
use crate::catalog::CatalogStore;
use crate::execution::{ExecutionLog, ExecutionMode};
use crate::{GalleriaError, Result};
use std::fs;
use tracing::{debug, error, info};

/// Runs operation groups against the filesystem and the catalog.
pub struct MigrationExecutor<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Execute every group in plan order.
    ///
    /// In dry-run mode only read-only checks run; the returned log holds the
    /// same descriptions commit mode would produce. In commit mode each
    /// catalog write is committed right after the filesystem step it
    /// depends on. Cancellation is honored before each group.
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionLog> {
        info!(
            "Executing {} artifact groups ({})",
            plan.groups.len(),
            mode
        );
        let mut log = ExecutionLog::new(mode);

        for group in &plan.groups {
            if cancel.check().is_err() {
                info!(
                    "Cancelled before artifact {}; earlier groups are complete",
                    group.artifact_id
                );
                return Err(GalleriaError::Cancelled);
            }
            self.execute_group(group, mode, &mut log)?;
        }

        info!("Finished {} artifact groups ({})", plan.groups.len(), mode);
        Ok(log)
    }

    fn execute_group(
        &self,
        group: &OperationGroup,
        mode: ExecutionMode,
        log: &mut ExecutionLog,
    ) -> Result<()> {
        let id = group.artifact_id;
        debug!("[{}] starting group of {} operations", id, group.operations.len());

        for operation in &group.operations {
            let outcome = match mode {
                ExecutionMode::DryRun => check(id, operation),
                ExecutionMode::Commit => self.apply(id, operation),
            };
            if let Err(e) = outcome {
                error!("[{}] failed to {}: {}", id, operation.describe(), e);
                return Err(e);
            }
            log.record(id, operation.describe());
        }
        Ok(())
    }

    fn apply(&self, artifact_id: i64, operation: &Operation) -> Result<()> {
        match operation {
            Operation::CreateDirectory { path } => {
                fs::create_dir_all(path).map_err(|e| GalleriaError::io_with_path(e, path))
            }
            Operation::CreateArchive { archive, members } => create_archive(archive, members),
            Operation::MoveFile { from, to, .. } => {
                if to.exists() {
                    return Err(GalleriaError::Collision {
                        artifact_id,
                        path: to.clone(),
                    });
                }
                fs::rename(from, to).map_err(|e| GalleriaError::io_with_path(e, from))
            }
            Operation::UpdatePagePath { sequence, to, .. } => {
                self.catalog.update_page_path(artifact_id, *sequence, to)
            }
            Operation::UpdateMasterPath { to, .. } => {
                self.catalog.update_master_path(artifact_id, to)
            }
            Operation::RemoveDirectory { path } => {
                fs::remove_dir_all(path).map_err(|e| GalleriaError::io_with_path(e, path))
            }
            Operation::RemoveEmptyDirectory { path } => {
                if !path.is_dir() {
                    return Ok(());
                }
                let mut entries =
                    fs::read_dir(path).map_err(|e| GalleriaError::io_with_path(e, path))?;
                if entries.next().is_some() {
                    debug!("[{}] kept non-empty directory {}", artifact_id, path.display());
                    return Ok(());
                }
                fs::remove_dir(path).map_err(|e| GalleriaError::io_with_path(e, path))
            }
        }
    }
}

/// Read-only checks performed in place of each operation during a dry run.
fn check(artifact_id: i64, operation: &Operation) -> Result<()> {
    match operation {
        Operation::CreateDirectory { path } => {
            if path.exists() {
                return Err(GalleriaError::Collision {
                    artifact_id,
                    path: path.clone(),
                });
            }
        }
        Operation::CreateArchive { archive, members } => {
            if archive.exists() {
                return Err(GalleriaError::Collision {
                    artifact_id,
                    path: archive.clone(),
                });
            }
            if let Some(missing) = members.iter().find(|m| !m.source.is_file()) {
                return Err(GalleriaError::precondition(
                    artifact_id,
                    format!("page does not exist: {}", missing.source.display()),
                ));
            }
        }
        Operation::MoveFile { from, to, .. } => {
            if !from.is_file() {
                return Err(GalleriaError::precondition(
                    artifact_id,
                    format!("page does not exist: {}", from.display()),
                ));
            }
            if to.exists() {
                return Err(GalleriaError::Collision {
                    artifact_id,
                    path: to.clone(),
                });
            }
        }
        Operation::RemoveDirectory { path } => {
            if !path.is_dir() {
                return Err(GalleriaError::precondition(
                    artifact_id,
                    format!("directory does not exist: {}", path.display()),
                ));
            }
        }
        Operation::UpdatePagePath { .. }
        | Operation::UpdateMasterPath { .. }
        | Operation::RemoveEmptyDirectory { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::PathCanonicalizer;
    use crate::catalog::{MasterRecord, PageRecord};
    use crate::config::{CatalogSchema, LayoutConfig};
    use crate::migration::{LayoutConvention, MigrationPlanner};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn setup(artifacts: &[i64]) -> (TempDir, PathBuf, CatalogStore) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("downloads");
        std::fs::create_dir_all(&root).unwrap();
        let catalog =
            CatalogStore::create(&tmp.path().join("db.sqlite"), CatalogSchema::default()).unwrap();
        for id in artifacts {
            let dir = format!("10/{}", id);
            catalog
                .insert_master(&MasterRecord::new(*id, 10, dir.clone()))
                .unwrap();
            for seq in 0..2 {
                let page = format!("{}/p_{}.png", dir, seq);
                touch(&root.join(&page));
                catalog
                    .insert_page(&PageRecord::new(*id, seq, page))
                    .unwrap();
            }
        }
        (tmp, root, catalog)
    }

    fn archive_plan(root: &Path, catalog: &CatalogStore) -> MigrationPlan {
        MigrationPlanner::new(LayoutConfig::new(root), PathCanonicalizer::default())
            .plan(catalog, LayoutConvention::Flat, LayoutConvention::Archive)
            .unwrap()
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (_tmp, root, catalog) = setup(&[1]);
        let plan = archive_plan(&root, &catalog);

        let log = MigrationExecutor::new(&catalog)
            .execute(&plan, ExecutionMode::DryRun, &CancellationToken::new())
            .unwrap();

        assert_eq!(log.len(), plan.operation_count());
        assert!(log.lines().iter().all(|l| l.starts_with("[1] WOULD ")));
        assert!(root.join("10/1/p_0.png").is_file());
        assert!(!root.join("10/1.zip").exists());
        assert_eq!(catalog.master(1).unwrap().unwrap().path(), Some("10/1"));
    }

    #[test]
    fn test_commit_matches_dry_run_descriptions() {
        let (_tmp, root, catalog) = setup(&[1, 2]);
        let plan = archive_plan(&root, &catalog);
        let executor = MigrationExecutor::new(&catalog);
        let token = CancellationToken::new();

        let dry = executor.execute(&plan, ExecutionMode::DryRun, &token).unwrap();
        let committed = executor.execute(&plan, ExecutionMode::Commit, &token).unwrap();

        assert_eq!(dry.descriptions(), committed.descriptions());
        assert_eq!(catalog.master(2).unwrap().unwrap().path(), Some("10/2.zip"));
        assert!(!root.join("10/2").exists());
    }

    #[test]
    fn test_cancel_stops_before_first_group() {
        let (_tmp, root, catalog) = setup(&[1]);
        let plan = archive_plan(&root, &catalog);
        let token = CancellationToken::new();
        token.cancel();

        let result = MigrationExecutor::new(&catalog).execute(&plan, ExecutionMode::Commit, &token);
        assert!(matches!(result, Err(GalleriaError::Cancelled)));
        assert!(root.join("10/1/p_0.png").is_file());
    }

    #[test]
    fn test_dry_run_detects_collision_created_after_planning() {
        let (_tmp, root, catalog) = setup(&[1]);
        let plan = archive_plan(&root, &catalog);
        touch(&root.join("10/1.zip"));

        let err = MigrationExecutor::new(&catalog)
            .execute(&plan, ExecutionMode::DryRun, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, GalleriaError::Collision { artifact_id: 1, .. }));
    }

    #[test]
    fn test_remove_empty_directory_keeps_non_empty() {
        let (_tmp, root, catalog) = setup(&[]);
        touch(&root.join("keep/file.txt"));
        std::fs::create_dir_all(root.join("empty")).unwrap();
        let plan = MigrationPlan {
            groups: vec![OperationGroup {
                artifact_id: 9,
                operations: vec![
                    Operation::RemoveEmptyDirectory {
                        path: root.join("keep"),
                    },
                    Operation::RemoveEmptyDirectory {
                        path: root.join("empty"),
                    },
                ],
            }],
            skipped: vec![],
        };

        MigrationExecutor::new(&catalog)
            .execute(&plan, ExecutionMode::Commit, &CancellationToken::new())
            .unwrap();
        assert!(root.join("keep").is_dir());
        assert!(!root.join("empty").exists());
    }
}
