//! Layout migrations.
//!
//! A migration is planned in full before anything is touched:
//! [`MigrationPlanner`] runs every pre-flight check and produces one
//! [`OperationGroup`] per artifact, and [`MigrationExecutor`] applies the
//! groups in order, in dry-run or commit mode.
//!
//! Groups are never interleaved. Within a group the catalog is updated right
//! after each filesystem step succeeds, so an interrupted group leaves some
//! pages re-pointed while the master still names the old location. The
//! [`crate::verify::Verifier`] reports exactly those artifacts.

mod executor;
mod planner;

pub use executor::MigrationExecutor;
pub use planner::MigrationPlanner;

use crate::archive::ArchiveMember;
use crate::GalleriaError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// On-disk storage convention for artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutConvention {
    /// `{<owner_id>} <owner name>/{<artifact_id>} <title>/<page>`
    Nested,
    /// `<owner_id>/<prefix><artifact_id>/<page>`
    Flat,
    /// `<owner_id>/<prefix><artifact_id>.zip` holding pages by base name.
    Archive,
}

impl LayoutConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutConvention::Nested => "nested",
            LayoutConvention::Flat => "flat",
            LayoutConvention::Archive => "archive",
        }
    }
}

impl fmt::Display for LayoutConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutConvention {
    type Err = GalleriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nested" => Ok(LayoutConvention::Nested),
            "flat" => Ok(LayoutConvention::Flat),
            "archive" => Ok(LayoutConvention::Archive),
            other => Err(GalleriaError::Config {
                message: format!(
                    "Unknown layout convention '{}' (expected nested, flat or archive)",
                    other
                ),
            }),
        }
    }
}

/// One step of an artifact's migration.
///
/// Filesystem paths are absolute; catalog paths are in the form that will
/// be written to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateDirectory {
        path: PathBuf,
    },
    CreateArchive {
        archive: PathBuf,
        members: Vec<ArchiveMember>,
    },
    MoveFile {
        sequence: i64,
        from: PathBuf,
        to: PathBuf,
    },
    UpdatePagePath {
        sequence: i64,
        from: String,
        to: String,
    },
    UpdateMasterPath {
        from: String,
        to: String,
    },
    /// Remove a source directory tree whose contents now live elsewhere.
    RemoveDirectory {
        path: PathBuf,
    },
    /// Remove a directory only if nothing is left in it.
    RemoveEmptyDirectory {
        path: PathBuf,
    },
}

impl Operation {
    /// Human-readable description, identical in dry-run and commit mode.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateDirectory { path } => {
                format!("create directory {}", path.display())
            }
            Operation::CreateArchive { archive, members } => {
                let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
                format!(
                    "create archive {} with members [{}]",
                    archive.display(),
                    names.join(", ")
                )
            }
            Operation::MoveFile { sequence, from, to } => format!(
                "move page {}: {} -> {}",
                sequence,
                from.display(),
                to.display()
            ),
            Operation::UpdatePagePath { sequence, from, to } => {
                format!("update page {}: {} -> {}", sequence, from, to)
            }
            Operation::UpdateMasterPath { from, to } => {
                format!("update master: {} -> {}", from, to)
            }
            Operation::RemoveDirectory { path } => {
                format!("remove directory {}", path.display())
            }
            Operation::RemoveEmptyDirectory { path } => {
                format!("remove directory if empty {}", path.display())
            }
        }
    }
}

/// Contiguous operations for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationGroup {
    pub artifact_id: i64,
    pub operations: Vec<Operation>,
}

/// Every group of a run, in ascending artifact order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub groups: Vec<OperationGroup>,
    /// Artifacts already in the target layout.
    pub skipped: Vec<i64>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.groups.iter().map(|g| g.operations.len()).sum()
    }

    pub fn group(&self, artifact_id: i64) -> Option<&OperationGroup> {
        self.groups.iter().find(|g| g.artifact_id == artifact_id)
    }
}
