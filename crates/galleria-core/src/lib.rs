//! Galleria Core - reconciliation and layout migration for a catalog of
//! downloaded artworks.
//!
//! A SQLite catalog records every artwork (a master record) and its pages.
//! Over the years the on-disk layout changed several times and the catalog
//! and the files drifted apart. This crate:
//!
//! - reconciles the catalog with the storage tree and classifies every
//!   artifact ([`reconcile`])
//! - removes orphans and broken downloads from a reconciliation report
//!   ([`cleanup`])
//! - plans and executes layout migrations, dry run first ([`migration`])
//! - verifies the result independently ([`verify`])
//!
//! The library never installs a logger; it emits `tracing` events and leaves
//! subscriber setup to the binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use galleria_core::{CancellationToken, ExecutionMode, Galleria, LayoutConvention};
//!
//! let engine = Galleria::builder("db.sqlite", "/workdir/downloads").build()?;
//! let plan = engine.plan_migration(LayoutConvention::Flat, LayoutConvention::Archive)?;
//! let log = engine.execute(&plan, ExecutionMode::DryRun, &CancellationToken::new())?;
//! for line in log.lines() {
//!     println!("{}", line);
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod canonical;
pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod migration;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod verify;

pub use cancel::{CancellationToken, CancelledError};
pub use canonical::{PathCanonicalizer, RewriteRule, RewriteTable};
pub use catalog::{CatalogContents, CatalogStore, MasterRecord, PageRecord};
pub use cleanup::{remove_empty_directories, Cleaner, CleanupSummary};
pub use config::{CatalogSchema, LayoutConfig};
pub use engine::{Galleria, GalleriaBuilder};
pub use error::{GalleriaError, Result};
pub use execution::{ExecutionLog, ExecutionMode};
pub use migration::{
    LayoutConvention, MigrationExecutor, MigrationPlan, MigrationPlanner, Operation,
    OperationGroup,
};
pub use reconcile::{DirectoryMatch, Reconciler};
pub use report::{Classification, ReconciliationReport};
pub use scanner::{FilesystemScanner, FilesystemSnapshot};
pub use verify::{VerificationReport, Verifier};
