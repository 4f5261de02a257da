//! Read-only post-migration verification.
//!
//! Re-reads the catalog and checks every recorded path against the disk
//! without consulting any earlier report. Archive members are compared by
//! exact name; everything else goes through the canonicalizer and must lie
//! inside the artifact's directory: the master directory itself, or the
//! directory holding a master file.

use crate::archive::{holds_pages, list_members};
use crate::canonical::PathCanonicalizer;
use crate::catalog::{CatalogStore, MasterRecord, PageRecord};
use crate::config::LayoutConfig;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationError {
    pub artifact_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub errors: Vec<VerificationError>,
    pub artifacts_checked: usize,
}

impl VerificationReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Distinct artifacts with at least one error, ascending.
    pub fn failed_artifacts(&self) -> Vec<i64> {
        self.errors
            .iter()
            .map(|e| e.artifact_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn push(&mut self, artifact_id: i64, message: String) {
        error!("[{}] {}", artifact_id, message);
        self.errors.push(VerificationError {
            artifact_id,
            message,
        });
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    layout: LayoutConfig,
    canonicalizer: PathCanonicalizer,
}

impl Verifier {
    pub fn new(layout: LayoutConfig, canonicalizer: PathCanonicalizer) -> Self {
        Self {
            layout,
            canonicalizer,
        }
    }

    pub fn verify(&self, catalog: &CatalogStore) -> Result<VerificationReport> {
        info!("Verifying catalog against {}", self.layout.root.display());
        let contents = catalog.load_all()?;
        let consistency = catalog.consistency()?;

        let mut report = VerificationReport {
            artifacts_checked: contents.masters.len(),
            ..Default::default()
        };
        for artifact_id in &consistency.pages_without_master {
            report.push(*artifact_id, "page records without a master record".to_string());
        }

        let mut physical: BTreeMap<PathBuf, Vec<i64>> = BTreeMap::new();
        for master in &contents.masters {
            let pages = contents.pages_of(master.artifact_id);
            if let Some(resolved) = self.verify_artifact(master, pages, &mut report) {
                physical.entry(resolved).or_default().push(master.artifact_id);
            }
        }

        for (path, ids) in &physical {
            if ids.len() > 1 {
                for id in ids {
                    report.push(
                        *id,
                        format!("shares storage path {} with {:?}", path.display(), ids),
                    );
                }
            }
        }

        if report.is_ok() {
            info!(
                "Verification completed successfully ({} artifacts)",
                report.artifacts_checked
            );
        } else {
            error!(
                "Verification failed with {} errors in {} artifacts",
                report.error_count(),
                report.failed_artifacts().len()
            );
        }
        Ok(report)
    }

    /// Check one artifact, returning the physical path its master resolved to.
    fn verify_artifact(
        &self,
        master: &MasterRecord,
        pages: &[PageRecord],
        report: &mut VerificationReport,
    ) -> Option<PathBuf> {
        let id = master.artifact_id;

        if pages.is_empty() {
            report.push(id, "master record has no pages".to_string());
        }
        let Some(recorded) = master.path() else {
            report.push(id, "master record has no path".to_string());
            return None;
        };
        let Some(resolved) = self
            .canonicalizer
            .resolve(&self.layout.resolve(recorded), |p| p.exists())
        else {
            report.push(id, format!("master path not found: {}", recorded));
            return None;
        };

        let container = resolved.is_file()
            && holds_pages(
                &resolved,
                recorded,
                pages.iter().filter_map(PageRecord::path),
                |page| self.resolve_page(page).is_some(),
            );

        if container {
            let members = match list_members(&resolved) {
                Ok(members) => members,
                Err(e) => {
                    report.push(id, format!("unreadable archive {}: {}", resolved.display(), e));
                    return Some(resolved);
                }
            };
            let mut expected = BTreeSet::new();
            for page in pages {
                match page.path() {
                    Some(name) if members.contains(name) => {
                        expected.insert(name.to_string());
                    }
                    Some(name) => report.push(id, format!("page not found in archive: {}", name)),
                    None => report.push(
                        id,
                        format!("page {} has no recorded path", page.sequence_number),
                    ),
                }
            }
            for extra in members.difference(&expected) {
                report.push(id, format!("archive member has no page record: {}", extra));
            }
        } else {
            let artifact_dir = if resolved.is_dir() {
                resolved.as_path()
            } else {
                resolved.parent().unwrap_or(resolved.as_path())
            };
            for page in pages {
                match page.path() {
                    Some(path) => match self.resolve_page(path) {
                        None => report.push(id, format!("page not found: {}", path)),
                        Some(found) if !found.starts_with(artifact_dir) => report.push(
                            id,
                            format!(
                                "page {} is outside the artifact directory {}",
                                path,
                                artifact_dir.display()
                            ),
                        ),
                        Some(_) => {}
                    },
                    None => report.push(
                        id,
                        format!("page {} has no recorded path", page.sequence_number),
                    ),
                }
            }
        }
        Some(resolved)
    }

    fn resolve_page(&self, recorded: &str) -> Option<PathBuf> {
        self.canonicalizer
            .resolve(&self.layout.resolve(recorded), |p: &Path| p.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{create_archive, ArchiveMember};
    use crate::config::CatalogSchema;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn setup() -> (TempDir, PathBuf, CatalogStore) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("downloads");
        std::fs::create_dir_all(&root).unwrap();
        let catalog =
            CatalogStore::create(&tmp.path().join("db.sqlite"), CatalogSchema::default()).unwrap();
        (tmp, root, catalog)
    }

    fn verifier(root: &Path) -> Verifier {
        Verifier::new(LayoutConfig::new(root), PathCanonicalizer::default())
    }

    fn archive(root: &Path, target: &str, names: &[&str]) {
        let staging = root.join(".staging");
        let members: Vec<ArchiveMember> = names
            .iter()
            .map(|n| {
                touch(&staging.join(n));
                ArchiveMember {
                    source: staging.join(n),
                    name: n.to_string(),
                }
            })
            .collect();
        create_archive(&root.join(target), &members).unwrap();
        std::fs::remove_dir_all(staging).unwrap();
    }

    #[test]
    fn test_directory_artifact_ok() {
        let (_tmp, root, catalog) = setup();
        touch(&root.join("10/1/p_0.png"));
        catalog.insert_master(&MasterRecord::new(1, 10, "10/1")).unwrap();
        catalog
            .insert_page(&PageRecord::new(1, 0, "10/1/p_0.png"))
            .unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.artifacts_checked, 1);
    }

    #[test]
    fn test_archive_members_exact_names() {
        let (_tmp, root, catalog) = setup();
        archive(&root, "10/1.zip", &["p_0.png", "extra.png"]);
        catalog.insert_master(&MasterRecord::new(1, 10, "10/1.zip")).unwrap();
        catalog.insert_page(&PageRecord::new(1, 0, "p_0.png")).unwrap();
        catalog.insert_page(&PageRecord::new(1, 1, "p_1.png")).unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        // p_1.png missing, extra.png unreferenced
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.failed_artifacts(), vec![1]);
    }

    #[test]
    fn test_single_file_with_legacy_extension() {
        let (_tmp, root, catalog) = setup();
        archive(&root, "10/7/ugoira.zip", &["000.jpg", "001.jpg"]);
        catalog
            .insert_master(&MasterRecord::new(7, 10, "10/7/ugoira.zip"))
            .unwrap();
        catalog
            .insert_page(&PageRecord::new(7, 0, "10/7/ugoira.zip"))
            .unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        assert_eq!(report.error_count(), 0, "{:?}", report.errors);
    }

    #[test]
    fn test_page_outside_master_directory() {
        let (_tmp, root, catalog) = setup();
        touch(&root.join("10/1/p_0.png"));
        touch(&root.join("10/pixiv_1/p_1.png"));
        catalog.insert_master(&MasterRecord::new(1, 10, "10/1")).unwrap();
        catalog
            .insert_page(&PageRecord::new(1, 0, "10/1/p_0.png"))
            .unwrap();
        catalog
            .insert_page(&PageRecord::new(1, 1, "10/pixiv_1/p_1.png"))
            .unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        assert_eq!(report.error_count(), 1);
        assert!(report.errors[0].message.contains("outside the artifact directory"));
    }

    #[test]
    fn test_unreadable_archive() {
        let (_tmp, root, catalog) = setup();
        touch(&root.join("10/1.zip"));
        catalog.insert_master(&MasterRecord::new(1, 10, "10/1.zip")).unwrap();
        catalog.insert_page(&PageRecord::new(1, 0, "p_0.png")).unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_structural_problems() {
        let (_tmp, root, catalog) = setup();
        touch(&root.join("10/1/p_0.png"));
        catalog.insert_master(&MasterRecord::new(1, 10, "10/1")).unwrap();
        catalog.insert_master(&MasterRecord::new(2, 10, "10/1")).unwrap();
        catalog
            .insert_page(&PageRecord::new(1, 0, "10/1/p_0.png"))
            .unwrap();
        catalog
            .insert_page(&PageRecord::new(3, 0, "10/3/p_0.png"))
            .unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        // 2 has no pages, 3 has no master, 1 and 2 share 10/1
        assert_eq!(report.failed_artifacts(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_master() {
        let (_tmp, root, catalog) = setup();
        catalog.insert_master(&MasterRecord::new(4, 10, "10/4")).unwrap();
        catalog
            .insert_page(&PageRecord::new(4, 0, "10/4/p_0.png"))
            .unwrap();

        let report = verifier(&root).verify(&catalog).unwrap();
        assert_eq!(report.error_count(), 1);
        assert!(report.errors[0].message.contains("master path not found"));
    }
}
