//! Reconciliation report and its JSON file format.
//!
//! The file is the hand-off between the validation pass and the cleanup
//! pass:
//!
//! ```json
//! {
//!   "orphan_files": ["..."],
//!   "orphan_directories": ["..."],
//!   "MASTER_UNREACHABLE": [12, 40]
//! }
//! ```
//!
//! Every collection is ordered so identical inputs serialize to identical
//! bytes.

use crate::{GalleriaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-artifact classification, first matching state wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Owner id is null or zero.
    NoOwner,
    /// Recorded path is null or empty.
    NoPath,
    /// No canonical candidate of the recorded path exists.
    MasterUnreachable,
    /// Master exists, but at least one page is unfetched or missing.
    PagesIncompleteMasterReachable,
    Ok,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::NoOwner,
        Classification::NoPath,
        Classification::MasterUnreachable,
        Classification::PagesIncompleteMasterReachable,
        Classification::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NoOwner => "NO_OWNER",
            Classification::NoPath => "NO_PATH",
            Classification::MasterUnreachable => "MASTER_UNREACHABLE",
            Classification::PagesIncompleteMasterReachable => {
                "PAGES_INCOMPLETE_MASTER_REACHABLE"
            }
            Classification::Ok => "OK",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Artifacts in this state are broken downloads that cleanup may purge.
    pub fn is_incomplete_download(&self) -> bool {
        matches!(
            self,
            Classification::MasterUnreachable | Classification::PagesIncompleteMasterReachable
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub classifications: BTreeMap<i64, Classification>,
    pub orphan_files: Vec<PathBuf>,
    pub orphan_directories: Vec<PathBuf>,
    /// Masters with no page recorded under the master's own path.
    pub self_reference_violations: Vec<i64>,
}

impl ReconciliationReport {
    /// Artifact ids in one state, ascending.
    pub fn artifacts_with(&self, class: Classification) -> Vec<i64> {
        self.classifications
            .iter()
            .filter(|(_, c)| **c == class)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn count(&self, class: Classification) -> usize {
        self.classifications.values().filter(|c| **c == class).count()
    }

    /// Artifacts cleanup would purge, ascending.
    pub fn incomplete_downloads(&self) -> Vec<i64> {
        self.classifications
            .iter()
            .filter(|(_, c)| c.is_incomplete_download())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.orphan_files.is_empty()
            && self.orphan_directories.is_empty()
            && self.classifications.values().all(|c| *c == Classification::Ok)
    }

    pub fn to_file(&self) -> ReportFile {
        let mut classifications: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (id, class) in &self.classifications {
            if *class != Classification::Ok {
                classifications
                    .entry(class.as_str().to_string())
                    .or_default()
                    .push(*id);
            }
        }

        ReportFile {
            orphan_files: self.orphan_files.iter().map(|p| display(p)).collect(),
            orphan_directories: self.orphan_directories.iter().map(|p| display(p)).collect(),
            self_reference_violations: self.self_reference_violations.clone(),
            classifications,
        }
    }

    /// Rebuild a report from its file form.
    ///
    /// Artifacts that were OK are not listed in the file and are therefore
    /// absent from the rebuilt classification map.
    pub fn from_file(file: ReportFile) -> Result<Self> {
        let mut classifications = BTreeMap::new();
        for (name, ids) in file.classifications {
            let class = Classification::from_name(&name).ok_or_else(|| GalleriaError::Config {
                message: format!("Unknown classification in report: {}", name),
            })?;
            for id in ids {
                classifications.insert(id, class);
            }
        }

        Ok(Self {
            classifications,
            orphan_files: file.orphan_files.into_iter().map(PathBuf::from).collect(),
            orphan_directories: file
                .orphan_directories
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            self_reference_violations: file.self_reference_violations,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_file())?)
    }

    /// Write the report atomically (temp file in the same directory, then
    /// rename over the target).
    pub fn write(&self, path: &Path) -> Result<()> {
        let serialized = self.to_json()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| GalleriaError::io_with_path(e, &dir))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| GalleriaError::io_with_path(e, &dir))?;
        temp.write_all(serialized.as_bytes())
            .map_err(|e| GalleriaError::io_with_path(e, path))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| GalleriaError::io_with_path(e, path))?;
        temp.persist(path)
            .map_err(|e| GalleriaError::io_with_path(e.error, path))?;

        debug!("Wrote report to {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| GalleriaError::io_with_path(e, path))?;
        let file: ReportFile = serde_json::from_str(&contents).map_err(|e| GalleriaError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })?;
        Self::from_file(file)
    }
}

/// On-disk shape of the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    #[serde(default)]
    pub orphan_files: Vec<String>,
    #[serde(default)]
    pub orphan_directories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub self_reference_violations: Vec<i64>,
    /// One array per observed non-OK classification.
    #[serde(flatten)]
    pub classifications: BTreeMap<String, Vec<i64>>,
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
