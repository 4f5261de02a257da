//! Structured catalog records.
//!
//! Rows are mapped into these types once, inside the store. Nothing
//! downstream indexes into raw row tuples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One downloaded artifact as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub artifact_id: i64,
    /// `None` or zero means the downloader never recorded an owner.
    pub owner_id: Option<i64>,
    pub title: Option<String>,
    pub recorded_path: Option<String>,
}

impl MasterRecord {
    pub fn new(artifact_id: i64, owner_id: i64, recorded_path: impl Into<String>) -> Self {
        Self {
            artifact_id,
            owner_id: Some(owner_id),
            title: None,
            recorded_path: Some(recorded_path.into()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Owner id when present and non-zero.
    pub fn owner(&self) -> Option<i64> {
        self.owner_id.filter(|id| *id != 0)
    }

    /// Recorded path when present and non-empty.
    pub fn path(&self) -> Option<&str> {
        self.recorded_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// One constituent file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub artifact_id: i64,
    pub sequence_number: i64,
    /// `None` marks a page the downloader knew of but never fetched.
    pub recorded_path: Option<String>,
}

impl PageRecord {
    pub fn new(artifact_id: i64, sequence_number: i64, recorded_path: impl Into<String>) -> Self {
        Self {
            artifact_id,
            sequence_number,
            recorded_path: Some(recorded_path.into()),
        }
    }

    pub fn unfetched(artifact_id: i64, sequence_number: i64) -> Self {
        Self {
            artifact_id,
            sequence_number,
            recorded_path: None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.recorded_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// Full catalog contents read in one pass, ordered by artifact id and page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogContents {
    pub masters: Vec<MasterRecord>,
    pub pages: BTreeMap<i64, Vec<PageRecord>>,
}

impl CatalogContents {
    pub fn pages_of(&self, artifact_id: i64) -> &[PageRecord] {
        self.pages
            .get(&artifact_id)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.values().flatten()
    }
}

/// Referential problems between the two tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Masters with no page rows.
    pub masters_without_pages: Vec<i64>,
    /// Artifact ids present in the page table but not the master table.
    pub pages_without_master: Vec<i64>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.masters_without_pages.is_empty() && self.pages_without_master.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_owner_treated_as_missing() {
        let mut master = MasterRecord::new(1, 0, "10/1");
        assert_eq!(master.owner(), None);
        master.owner_id = Some(10);
        assert_eq!(master.owner(), Some(10));
    }

    #[test]
    fn test_empty_path_treated_as_missing() {
        let master = MasterRecord::new(1, 10, "");
        assert_eq!(master.path(), None);
        assert_eq!(PageRecord::unfetched(1, 0).path(), None);
    }

    #[test]
    fn test_pages_of_unknown_artifact_is_empty() {
        let contents = CatalogContents::default();
        assert!(contents.pages_of(99).is_empty());
    }
}
