//! Catalog-versus-filesystem reconciliation.
//!
//! # Classification
//!
//! Each master record gets exactly one state, checked in this order:
//!
//! 1. `NO_OWNER`: owner id null or zero
//! 2. `NO_PATH`: recorded path null or empty
//! 3. `MASTER_UNREACHABLE`: no canonical candidate of the path exists
//! 4. `PAGES_INCOMPLETE_MASTER_REACHABLE`: a page is unfetched or missing
//! 5. `OK`
//!
//! Pages of an artifact stored as an archive are looked up as archive
//! members by base name; all other pages are looked up on disk through every
//! canonical candidate. A master counts as an archive only when its pages
//! are member names (see [`holds_pages`]). When the scan skipped archive
//! listing, member pages cannot be checked and are taken as present.
//!
//! # Orphans
//!
//! A file is an orphan when none of the forms it may have been recorded
//! under matches a recorded master or page path. An empty directory is an
//! orphan when no recorded path lies at or below it.

use crate::archive::holds_pages;
use crate::canonical::PathCanonicalizer;
use crate::catalog::{CatalogContents, CatalogStore, MasterRecord, PageRecord};
use crate::config::LayoutConfig;
use crate::report::{Classification, ReconciliationReport};
use crate::scanner::FilesystemSnapshot;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How empty directories are matched against recorded paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryMatch {
    /// The directory is referenced when a recorded path lies at or below it.
    #[default]
    Exact,
    /// The directory is referenced when its name occurs anywhere in a
    /// recorded page path. Misses orphans whose name happens to appear in an
    /// unrelated path; kept only for comparison with older reports.
    Substring,
}

/// Where an artifact's master record resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MasterLocation {
    Archive(PathBuf),
    Filesystem(PathBuf),
}

/// Compares catalog contents with a filesystem snapshot.
#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: LayoutConfig,
    canonicalizer: PathCanonicalizer,
    directory_match: DirectoryMatch,
}

impl Reconciler {
    pub fn new(layout: LayoutConfig, canonicalizer: PathCanonicalizer) -> Self {
        Self {
            layout,
            canonicalizer,
            directory_match: DirectoryMatch::default(),
        }
    }

    pub fn with_directory_match(mut self, directory_match: DirectoryMatch) -> Self {
        self.directory_match = directory_match;
        self
    }

    /// Read the catalog and reconcile it against `snapshot`.
    pub fn reconcile(
        &self,
        catalog: &CatalogStore,
        snapshot: &FilesystemSnapshot,
    ) -> Result<ReconciliationReport> {
        let consistency = catalog.consistency()?;
        for artifact_id in &consistency.pages_without_master {
            warn!("[{}] page records exist without a master record", artifact_id);
        }

        let contents = catalog.load_all()?;
        Ok(self.reconcile_contents(&contents, snapshot))
    }

    /// Pure reconciliation over already loaded records.
    pub fn reconcile_contents(
        &self,
        contents: &CatalogContents,
        snapshot: &FilesystemSnapshot,
    ) -> ReconciliationReport {
        info!("Validating {} master records", contents.masters.len());

        let mut classifications = BTreeMap::new();
        let mut self_reference_violations = Vec::new();
        let mut locations: BTreeMap<i64, MasterLocation> = BTreeMap::new();

        for master in &contents.masters {
            let pages = contents.pages_of(master.artifact_id);

            if !has_self_reference(master, pages) {
                warn!(
                    "[{}] no page record shares the master path {:?}",
                    master.artifact_id, master.recorded_path
                );
                self_reference_violations.push(master.artifact_id);
            }

            let location = master
                .path()
                .and_then(|p| self.locate_master(p, pages, snapshot));
            let class = self.classify(master, pages, location.as_ref(), snapshot);
            if let Some(location) = location {
                locations.insert(master.artifact_id, location);
            }
            classifications.insert(master.artifact_id, class);
        }
        info!("Master record validation complete");

        info!("Scanning for orphan files and directories");
        let referenced = self.referenced_paths(contents, &locations);
        let orphan_files = self.orphan_files(snapshot, &referenced);
        let orphan_directories = self.orphan_directories(contents, snapshot, &referenced);
        info!(
            "Found {} orphan files and {} orphan directories",
            orphan_files.len(),
            orphan_directories.len()
        );

        ReconciliationReport {
            classifications,
            orphan_files,
            orphan_directories,
            self_reference_violations,
        }
    }

    fn classify(
        &self,
        master: &MasterRecord,
        pages: &[PageRecord],
        location: Option<&MasterLocation>,
        snapshot: &FilesystemSnapshot,
    ) -> Classification {
        let id = master.artifact_id;

        if master.owner().is_none() {
            error!("[{}] has no owner id", id);
            return Classification::NoOwner;
        }
        let Some(path) = master.path() else {
            error!("[{}] has no recorded path", id);
            return Classification::NoPath;
        };
        let Some(location) = location else {
            error!("[{}] incomplete download, master missing: {}", id, path);
            return Classification::MasterUnreachable;
        };

        for page in pages {
            match page.path() {
                None => {
                    error!(
                        "[{}] page {} has no recorded path",
                        id, page.sequence_number
                    );
                    return Classification::PagesIncompleteMasterReachable;
                }
                Some(page_path) if !self.page_reachable(page_path, location, snapshot) => {
                    error!("[{}] incomplete download, missing page {}", id, page_path);
                    return Classification::PagesIncompleteMasterReachable;
                }
                Some(_) => {}
            }
        }

        Classification::Ok
    }

    fn locate_master(
        &self,
        recorded: &str,
        pages: &[PageRecord],
        snapshot: &FilesystemSnapshot,
    ) -> Option<MasterLocation> {
        let resolved = self
            .canonicalizer
            .resolve(&self.layout.resolve(recorded), |p| snapshot.exists(p))?;
        let container = snapshot.archive(&resolved).is_some()
            && holds_pages(
                &resolved,
                recorded,
                pages.iter().filter_map(PageRecord::path),
                |page| self.on_disk(page, snapshot),
            );
        if container {
            Some(MasterLocation::Archive(resolved))
        } else {
            Some(MasterLocation::Filesystem(resolved))
        }
    }

    fn on_disk(&self, recorded: &str, snapshot: &FilesystemSnapshot) -> bool {
        self.canonicalizer
            .resolve(&self.layout.resolve(recorded), |p| snapshot.is_file(p))
            .is_some()
    }

    fn page_reachable(
        &self,
        recorded: &str,
        location: &MasterLocation,
        snapshot: &FilesystemSnapshot,
    ) -> bool {
        match location {
            MasterLocation::Archive(archive) => match snapshot.archive(archive) {
                Some(listing) if listing.is_listed() => listing.contains(&base_name(recorded)),
                Some(_) => {
                    debug!(
                        "{} not listed, assuming member {} present",
                        archive.display(),
                        recorded
                    );
                    true
                }
                None => false,
            },
            MasterLocation::Filesystem(_) => self.on_disk(recorded, snapshot),
        }
    }

    /// Resolved recorded paths of every master and every page that lives
    /// directly on disk (archive members excluded).
    fn referenced_paths(
        &self,
        contents: &CatalogContents,
        locations: &BTreeMap<i64, MasterLocation>,
    ) -> BTreeSet<PathBuf> {
        let mut referenced = BTreeSet::new();
        for master in &contents.masters {
            if let Some(path) = master.path() {
                referenced.insert(self.layout.resolve(path));
            }
            if let Some(location) = locations.get(&master.artifact_id) {
                let resolved = match location {
                    MasterLocation::Archive(p) | MasterLocation::Filesystem(p) => p,
                };
                referenced.insert(resolved.clone());
            }
        }

        for (artifact_id, pages) in &contents.pages {
            if matches!(locations.get(artifact_id), Some(MasterLocation::Archive(_))) {
                continue;
            }
            for path in pages.iter().filter_map(PageRecord::path) {
                referenced.insert(self.layout.resolve(path));
            }
        }
        referenced
    }

    fn orphan_files(
        &self,
        snapshot: &FilesystemSnapshot,
        referenced: &BTreeSet<PathBuf>,
    ) -> Vec<PathBuf> {
        let mut orphans = Vec::new();
        for file in snapshot.files() {
            let matched = self
                .canonicalizer
                .recorded_forms(file)
                .iter()
                .any(|form| referenced.contains(form));
            if !matched {
                warn!("Found orphan file: {}", file.display());
                orphans.push(file.to_path_buf());
            }
        }
        orphans
    }

    fn orphan_directories(
        &self,
        contents: &CatalogContents,
        snapshot: &FilesystemSnapshot,
        referenced: &BTreeSet<PathBuf>,
    ) -> Vec<PathBuf> {
        let covered: BTreeSet<&Path> = referenced
            .iter()
            .flat_map(|p| p.ancestors())
            .collect();

        let mut orphans = Vec::new();
        for dir in snapshot.empty_directories() {
            let is_referenced = match self.directory_match {
                DirectoryMatch::Exact => covered.contains(dir),
                DirectoryMatch::Substring => {
                    let name = dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    contents
                        .all_pages()
                        .filter_map(PageRecord::path)
                        .any(|p| p.contains(&name))
                }
            };
            if !is_referenced {
                warn!("Found orphan directory: {}", dir.display());
                orphans.push(dir.to_path_buf());
            }
        }
        orphans
    }
}

fn has_self_reference(master: &MasterRecord, pages: &[PageRecord]) -> bool {
    match master.path() {
        Some(path) => pages.iter().any(|p| p.path() == Some(path)),
        None => false,
    }
}

/// Final component of a recorded path, the name used inside archives.
pub(crate) fn base_name(recorded: &str) -> String {
    Path::new(recorded)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| recorded.to_string())
}
