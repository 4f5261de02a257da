//! Pre-flight checks and operation planning.
//!
//! Planning reads the catalog and the filesystem but never writes to either.
//! Any failed check aborts the whole plan: a migration removes source
//! directories, so a run either starts with every artifact known to be safe
//! or does not start at all.

use super::{LayoutConvention, MigrationPlan, Operation, OperationGroup};
use crate::archive::{holds_pages, ArchiveMember};
use crate::canonical::PathCanonicalizer;
use crate::catalog::{CatalogStore, MasterRecord, PageRecord};
use crate::config::LayoutConfig;
use crate::{GalleriaError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};

/// `{123} some name` as used by the nested layout for owner and artifact
/// directories.
static BRACED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").expect("braced id regex must compile"));

/// An artifact whose master and pages all resolved on disk.
#[derive(Debug)]
struct SourceArtifact {
    artifact_id: i64,
    owner_id: i64,
    master_recorded: String,
    master_resolved: PathBuf,
    /// Directory holding the pages.
    artifact_dir: PathBuf,
    pages: Vec<SourcePage>,
}

#[derive(Debug)]
struct SourcePage {
    sequence: i64,
    recorded: String,
    resolved: PathBuf,
    /// Base name of the physical file.
    name: String,
}

/// Computes per-artifact operation groups for a layout migration.
#[derive(Debug, Clone)]
pub struct MigrationPlanner {
    layout: LayoutConfig,
    canonicalizer: PathCanonicalizer,
}

impl MigrationPlanner {
    pub fn new(layout: LayoutConfig, canonicalizer: PathCanonicalizer) -> Self {
        Self {
            layout,
            canonicalizer,
        }
    }

    /// Plan a migration of every artifact from `from` to `to`.
    ///
    /// Supported: nested to flat, nested to archive, flat to archive.
    /// Artifacts already at their target location are skipped.
    pub fn plan(
        &self,
        catalog: &CatalogStore,
        from: LayoutConvention,
        to: LayoutConvention,
    ) -> Result<MigrationPlan> {
        use LayoutConvention::*;
        if !matches!((from, to), (Nested, Flat) | (Nested, Archive) | (Flat, Archive)) {
            return Err(GalleriaError::UnsupportedMigration {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let contents = catalog.load_all()?;
        info!(
            "Planning {} -> {} migration for {} artifacts",
            from,
            to,
            contents.masters.len()
        );

        let mut plan = MigrationPlan::default();
        let mut claimed: BTreeMap<PathBuf, i64> = BTreeMap::new();

        for master in &contents.masters {
            let artifact_id = master.artifact_id;
            let pages = contents.pages_of(artifact_id);

            let (owner_id, master_recorded, master_resolved) = self.resolve_master(master)?;
            let target = match to {
                Archive => self.layout.root.join(self.layout.archive_path(owner_id, artifact_id)),
                _ => self
                    .layout
                    .root
                    .join(self.layout.flat_artifact_dir(owner_id, artifact_id)),
            };

            if self.already_migrated(&master_resolved, &target, to) {
                info!("[{}] already migrated to {}, skipping", artifact_id, target.display());
                plan.skipped.push(artifact_id);
                continue;
            }

            let source =
                self.resolve_source(master, owner_id, master_recorded, master_resolved, pages)?;
            self.validate_source_layout(&source, from)?;

            if let Some(other) = claimed.insert(target.clone(), artifact_id) {
                error!(
                    "[{}] target {} is also claimed by artifact {}",
                    artifact_id,
                    target.display(),
                    other
                );
                return Err(GalleriaError::Collision {
                    artifact_id,
                    path: target,
                });
            }
            if target.exists() {
                error!("[{}] target already exists: {}", artifact_id, target.display());
                return Err(GalleriaError::Collision {
                    artifact_id,
                    path: target,
                });
            }

            let operations = match to {
                Archive => self.archive_operations(&source, &target, from),
                _ => self.flat_operations(&source, &target)?,
            };
            debug!("[{}] planned {} operations", artifact_id, operations.len());
            plan.groups.push(OperationGroup {
                artifact_id,
                operations,
            });
        }

        info!(
            "Planned {} artifact groups ({} operations), {} already migrated",
            plan.groups.len(),
            plan.operation_count(),
            plan.skipped.len()
        );
        Ok(plan)
    }

    /// Plan catalog-only rewrites of paths recorded under a legacy extension.
    ///
    /// A path is rewritten when its legacy form is missing and its current
    /// form exists. If neither exists the plan fails.
    pub fn plan_extension_rewrite(&self, catalog: &CatalogStore) -> Result<MigrationPlan> {
        let contents = catalog.load_all()?;
        info!(
            "Planning extension rewrite for {} artifacts",
            contents.masters.len()
        );

        let mut plan = MigrationPlan::default();
        for master in &contents.masters {
            let artifact_id = master.artifact_id;
            let mut operations = Vec::new();
            let mut stored_as_archive = false;

            if let Some(recorded) = master.path() {
                let pages = contents.pages_of(artifact_id);
                stored_as_archive = self
                    .resolve_file(recorded)
                    .map(|file| self.holds_pages(&file, recorded, pages))
                    .unwrap_or(false);
                if let Some(to) = self.rewritten(artifact_id, recorded)? {
                    operations.push(Operation::UpdateMasterPath {
                        from: recorded.to_string(),
                        to,
                    });
                }
            }

            // Pages of an archive are member names, not filesystem paths.
            if !stored_as_archive {
                for page in contents.pages_of(artifact_id) {
                    let Some(recorded) = page.path() else {
                        continue;
                    };
                    if let Some(to) = self.rewritten(artifact_id, recorded)? {
                        operations.push(Operation::UpdatePagePath {
                            sequence: page.sequence_number,
                            from: recorded.to_string(),
                            to,
                        });
                    }
                }
            }

            if operations.is_empty() {
                continue;
            }
            plan.groups.push(OperationGroup {
                artifact_id,
                operations,
            });
        }

        info!(
            "Planned {} extension rewrites across {} artifacts",
            plan.operation_count(),
            plan.groups.len()
        );
        Ok(plan)
    }

    fn rewritten(&self, artifact_id: i64, recorded: &str) -> Result<Option<String>> {
        let Some(current) = self.canonicalizer.current_form(Path::new(recorded)) else {
            return Ok(None);
        };
        if self.layout.resolve(recorded).exists() {
            return Ok(None);
        }
        let current = current.to_string_lossy().into_owned();
        if self.layout.resolve(&current).exists() {
            Ok(Some(current))
        } else {
            error!("[{}] neither {} nor {} exists", artifact_id, recorded, current);
            Err(GalleriaError::precondition(
                artifact_id,
                format!("neither {} nor {} exists", recorded, current),
            ))
        }
    }

    fn resolve_master(&self, master: &MasterRecord) -> Result<(i64, String, PathBuf)> {
        let artifact_id = master.artifact_id;
        let owner_id = master
            .owner()
            .ok_or_else(|| fail(artifact_id, "master record has no owner id".to_string()))?;
        let recorded = master
            .path()
            .ok_or_else(|| fail(artifact_id, "master record has no path".to_string()))?;
        let resolved = self
            .canonicalizer
            .resolve(&self.layout.resolve(recorded), |p| p.exists())
            .ok_or_else(|| fail(artifact_id, format!("master path does not exist: {}", recorded)))?;
        Ok((owner_id, recorded.to_string(), resolved))
    }

    fn resolve_file(&self, recorded: &str) -> Option<PathBuf> {
        self.canonicalizer
            .resolve(&self.layout.resolve(recorded), |p| p.is_file())
    }

    fn holds_pages(&self, master: &Path, master_recorded: &str, pages: &[PageRecord]) -> bool {
        holds_pages(
            master,
            master_recorded,
            pages.iter().filter_map(PageRecord::path),
            |page| self.resolve_file(page).is_some(),
        )
    }

    fn already_migrated(&self, master_resolved: &Path, target: &Path, to: LayoutConvention) -> bool {
        match to {
            LayoutConvention::Archive => master_resolved == target,
            _ => master_resolved == target || master_resolved.parent() == Some(target),
        }
    }

    fn resolve_source(
        &self,
        master: &MasterRecord,
        owner_id: i64,
        master_recorded: String,
        master_resolved: PathBuf,
        pages: &[PageRecord],
    ) -> Result<SourceArtifact> {
        let artifact_id = master.artifact_id;

        if master_resolved.is_file()
            && self.holds_pages(&master_resolved, &master_recorded, pages)
        {
            return Err(fail(
                artifact_id,
                format!("master is already an archive: {}", master_resolved.display()),
            ));
        }
        let artifact_dir = if master_resolved.is_dir() {
            master_resolved.clone()
        } else {
            master_resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        };
        if artifact_dir == self.layout.root || !artifact_dir.starts_with(&self.layout.root) {
            return Err(fail(
                artifact_id,
                format!(
                    "artifact directory {} is not below the storage root",
                    artifact_dir.display()
                ),
            ));
        }

        if pages.is_empty() {
            return Err(fail(artifact_id, "artifact has no page records".to_string()));
        }

        let mut names = BTreeSet::new();
        let mut resolved_pages = Vec::with_capacity(pages.len());
        for page in pages {
            let recorded = page.path().ok_or_else(|| {
                fail(
                    artifact_id,
                    format!("page {} has no recorded path", page.sequence_number),
                )
            })?;
            let resolved = self
                .resolve_file(recorded)
                .ok_or_else(|| fail(artifact_id, format!("page does not exist: {}", recorded)))?;
            let name = resolved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !names.insert(name.clone()) {
                return Err(fail(
                    artifact_id,
                    format!("two pages share the file name {}", name),
                ));
            }
            resolved_pages.push(SourcePage {
                sequence: page.sequence_number,
                recorded: recorded.to_string(),
                resolved,
                name,
            });
        }

        if master_resolved.is_file()
            && !resolved_pages.iter().any(|p| p.resolved == master_resolved)
        {
            return Err(fail(
                artifact_id,
                format!(
                    "master file {} is not one of the artifact's pages",
                    master_resolved.display()
                ),
            ));
        }

        Ok(SourceArtifact {
            artifact_id,
            owner_id,
            master_recorded,
            master_resolved,
            artifact_dir,
            pages: resolved_pages,
        })
    }

    fn validate_source_layout(&self, source: &SourceArtifact, from: LayoutConvention) -> Result<()> {
        let artifact_id = source.artifact_id;
        match from {
            LayoutConvention::Nested => {
                let artifact_name = dir_name(&source.artifact_dir);
                let owner_name = source
                    .artifact_dir
                    .parent()
                    .map(dir_name)
                    .unwrap_or_default();
                let found_artifact = braced_id(&artifact_name);
                let found_owner = braced_id(&owner_name);
                if found_artifact != Some(artifact_id) {
                    return Err(fail(
                        artifact_id,
                        format!(
                            "artifact id mismatch: directory '{}' names {:?}",
                            artifact_name, found_artifact
                        ),
                    ));
                }
                if found_owner != Some(source.owner_id) {
                    return Err(fail(
                        artifact_id,
                        format!(
                            "owner id mismatch: expected {}, directory '{}' names {:?}",
                            source.owner_id, owner_name, found_owner
                        ),
                    ));
                }
            }
            LayoutConvention::Flat => {
                let expected = self
                    .layout
                    .root
                    .join(self.layout.flat_artifact_dir(source.owner_id, artifact_id));
                if source.artifact_dir != expected {
                    return Err(fail(
                        artifact_id,
                        format!(
                            "artifact directory {} is not the flat layout path {}",
                            source.artifact_dir.display(),
                            expected.display()
                        ),
                    ));
                }
            }
            LayoutConvention::Archive => {}
        }
        Ok(())
    }

    fn archive_operations(
        &self,
        source: &SourceArtifact,
        archive: &Path,
        from: LayoutConvention,
    ) -> Vec<Operation> {
        let mut operations = vec![Operation::CreateArchive {
            archive: archive.to_path_buf(),
            members: source
                .pages
                .iter()
                .map(|p| ArchiveMember {
                    source: p.resolved.clone(),
                    name: p.name.clone(),
                })
                .collect(),
        }];

        for page in &source.pages {
            operations.push(Operation::UpdatePagePath {
                sequence: page.sequence,
                from: page.recorded.clone(),
                to: page.name.clone(),
            });
        }

        let relative = self
            .layout
            .archive_path(source.owner_id, source.artifact_id);
        operations.push(Operation::UpdateMasterPath {
            from: source.master_recorded.clone(),
            to: self
                .layout
                .record(&relative, is_absolute(&source.master_recorded)),
        });
        operations.push(Operation::RemoveDirectory {
            path: source.artifact_dir.clone(),
        });

        if from == LayoutConvention::Nested {
            if let Some(owner_dir) = source.artifact_dir.parent() {
                operations.push(Operation::RemoveEmptyDirectory {
                    path: owner_dir.to_path_buf(),
                });
            }
        }
        operations
    }

    fn flat_operations(&self, source: &SourceArtifact, target_dir: &Path) -> Result<Vec<Operation>> {
        let relative_dir = self
            .layout
            .flat_artifact_dir(source.owner_id, source.artifact_id);

        let mut operations = vec![Operation::CreateDirectory {
            path: target_dir.to_path_buf(),
        }];

        for page in &source.pages {
            operations.push(Operation::MoveFile {
                sequence: page.sequence,
                from: page.resolved.clone(),
                to: target_dir.join(&page.name),
            });
            operations.push(Operation::UpdatePagePath {
                sequence: page.sequence,
                from: page.recorded.clone(),
                to: self
                    .layout
                    .record(&relative_dir.join(&page.name), is_absolute(&page.recorded)),
            });
        }

        // A master recorded as one of its page files follows that page.
        let master_relative = if source.master_resolved.is_dir() {
            relative_dir
        } else {
            let name = source.master_resolved.file_name().ok_or_else(|| {
                fail(source.artifact_id, "master path has no file name".to_string())
            })?;
            relative_dir.join(name)
        };
        operations.push(Operation::UpdateMasterPath {
            from: source.master_recorded.clone(),
            to: self
                .layout
                .record(&master_relative, is_absolute(&source.master_recorded)),
        });

        operations.push(Operation::RemoveEmptyDirectory {
            path: source.artifact_dir.clone(),
        });
        if let Some(owner_dir) = source.artifact_dir.parent() {
            operations.push(Operation::RemoveEmptyDirectory {
                path: owner_dir.to_path_buf(),
            });
        }
        Ok(operations)
    }
}

/// Log and build a precondition failure.
fn fail(artifact_id: i64, message: String) -> GalleriaError {
    error!("[{}] {}", artifact_id, message);
    GalleriaError::precondition(artifact_id, message)
}

fn braced_id(name: &str) -> Option<i64> {
    BRACED_ID
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_absolute(recorded: &str) -> bool {
    Path::new(recorded).is_absolute()
}
