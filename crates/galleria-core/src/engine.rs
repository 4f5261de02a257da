//! Facade wiring the components to one catalog and one storage root.

use crate::canonical::{PathCanonicalizer, RewriteTable};
use crate::catalog::CatalogStore;
use crate::cleanup::{Cleaner, CleanupSummary};
use crate::config::{CatalogSchema, LayoutConfig};
use crate::execution::{ExecutionLog, ExecutionMode};
use crate::migration::{LayoutConvention, MigrationExecutor, MigrationPlan, MigrationPlanner};
use crate::reconcile::{DirectoryMatch, Reconciler};
use crate::report::ReconciliationReport;
use crate::scanner::FilesystemScanner;
use crate::verify::{VerificationReport, Verifier};
use crate::{CancellationToken, GalleriaError, Result};
use std::path::PathBuf;

/// Builder for [`Galleria`].
///
/// # Example
///
/// ```rust,ignore
/// use galleria_core::Galleria;
///
/// let engine = Galleria::builder("db.sqlite", "/workdir/downloads")
///     .artifact_dir_prefix("pixiv_")
///     .build()?;
/// let report = engine.validate()?;
/// ```
pub struct GalleriaBuilder {
    database: PathBuf,
    root: PathBuf,
    schema: CatalogSchema,
    artifact_dir_prefix: String,
    rewrite_table: RewriteTable,
    directory_match: DirectoryMatch,
    list_archives: bool,
}

impl GalleriaBuilder {
    pub fn new(database: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            root: root.into(),
            schema: CatalogSchema::default(),
            artifact_dir_prefix: String::new(),
            rewrite_table: RewriteTable::default(),
            directory_match: DirectoryMatch::default(),
            list_archives: true,
        }
    }

    /// Table and column names of the catalog.
    ///
    /// Default: the downloader's historical names.
    pub fn schema(mut self, schema: CatalogSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Prefix of artifact directories and archives in flat layouts.
    ///
    /// Default: empty
    pub fn artifact_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.artifact_dir_prefix = prefix.into();
        self
    }

    pub fn rewrite_table(mut self, table: RewriteTable) -> Self {
        self.rewrite_table = table;
        self
    }

    pub fn directory_match(mut self, directory_match: DirectoryMatch) -> Self {
        self.directory_match = directory_match;
        self
    }

    /// Open archives during scans to check page membership.
    ///
    /// When disabled, pages stored in archives are taken as present, so an
    /// archived artifact is never reported as an incomplete download.
    ///
    /// Default: `true`
    pub fn list_archives(mut self, enable: bool) -> Self {
        self.list_archives = enable;
        self
    }

    /// Open the catalog and check the storage root.
    pub fn build(self) -> Result<Galleria> {
        if !self.root.is_dir() {
            return Err(GalleriaError::Config {
                message: format!("Storage root is not a directory: {}", self.root.display()),
            });
        }
        let catalog = CatalogStore::open(&self.database, self.schema)?;

        Ok(Galleria {
            catalog,
            layout: LayoutConfig::new(self.root)
                .with_artifact_dir_prefix(self.artifact_dir_prefix),
            canonicalizer: PathCanonicalizer::new(self.rewrite_table),
            directory_match: self.directory_match,
            list_archives: self.list_archives,
        })
    }
}

/// One catalog and its storage root.
pub struct Galleria {
    catalog: CatalogStore,
    layout: LayoutConfig,
    canonicalizer: PathCanonicalizer,
    directory_match: DirectoryMatch,
    list_archives: bool,
}

impl Galleria {
    pub fn builder(database: impl Into<PathBuf>, root: impl Into<PathBuf>) -> GalleriaBuilder {
        GalleriaBuilder::new(database, root)
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Scan the storage root and reconcile it with the catalog.
    pub fn validate(&self) -> Result<ReconciliationReport> {
        let mut scanner = FilesystemScanner::new(&self.layout.root);
        if !self.list_archives {
            scanner = scanner.without_archive_listing();
        }
        let snapshot = scanner.scan()?;
        Reconciler::new(self.layout.clone(), self.canonicalizer.clone())
            .with_directory_match(self.directory_match)
            .reconcile(&self.catalog, &snapshot)
    }

    pub fn cleanup(
        &self,
        report: &ReconciliationReport,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<CleanupSummary> {
        Cleaner::new(&self.catalog, self.layout.clone(), self.canonicalizer.clone())
            .run(report, mode, cancel)
    }

    pub fn plan_migration(
        &self,
        from: LayoutConvention,
        to: LayoutConvention,
    ) -> Result<MigrationPlan> {
        self.planner().plan(&self.catalog, from, to)
    }

    pub fn plan_extension_rewrite(&self) -> Result<MigrationPlan> {
        self.planner().plan_extension_rewrite(&self.catalog)
    }

    pub fn execute(
        &self,
        plan: &MigrationPlan,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionLog> {
        MigrationExecutor::new(&self.catalog).execute(plan, mode, cancel)
    }

    pub fn verify(&self) -> Result<VerificationReport> {
        Verifier::new(self.layout.clone(), self.canonicalizer.clone()).verify(&self.catalog)
    }

    fn planner(&self) -> MigrationPlanner {
        MigrationPlanner::new(self.layout.clone(), self.canonicalizer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MasterRecord, PageRecord};
    use tempfile::TempDir;

    #[test]
    fn test_build_requires_root_and_catalog() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("db.sqlite");

        let missing_root = Galleria::builder(&db, tmp.path().join("absent")).build();
        assert!(matches!(missing_root, Err(GalleriaError::Config { .. })));

        let missing_db = Galleria::builder(&db, tmp.path()).build();
        assert!(matches!(missing_db, Err(GalleriaError::Config { .. })));
    }

    #[test]
    fn test_validate_through_facade() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("db.sqlite");
        let root = tmp.path().join("dl");
        std::fs::create_dir_all(root.join("10/1")).unwrap();
        std::fs::write(root.join("10/1/p_0.png"), b"x").unwrap();
        {
            let catalog = CatalogStore::create(&db, CatalogSchema::default()).unwrap();
            catalog.insert_master(&MasterRecord::new(1, 10, "10/1")).unwrap();
            catalog
                .insert_page(&PageRecord::new(1, 0, "10/1/p_0.png"))
                .unwrap();
        }

        let engine = Galleria::builder(&db, &root).build().unwrap();
        let report = engine.validate().unwrap();
        assert!(report.is_clean());
        assert!(engine.verify().unwrap().is_ok());
    }
}
