//! Filesystem snapshot of the storage root.
//!
//! One walk records every regular file, every directory with an emptiness
//! flag, and the member list of every archive. Reconciliation then runs
//! against this snapshot without touching the disk again, which keeps it a
//! pure function of (catalog, snapshot).

use crate::archive::{is_archive_path, list_members};
use crate::{GalleriaError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Contents of one archive as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveListing {
    Members(BTreeSet<String>),
    /// The file has an archive extension but could not be read as one.
    Unreadable(String),
    /// Listing was skipped for this scan; membership is unknown.
    Unlisted,
}

impl ArchiveListing {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            ArchiveListing::Members(members) => members.contains(name),
            ArchiveListing::Unreadable(_) | ArchiveListing::Unlisted => false,
        }
    }

    pub fn is_listed(&self) -> bool {
        !matches!(self, ArchiveListing::Unlisted)
    }
}

/// Immutable view of the storage tree at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemSnapshot {
    root: PathBuf,
    files: BTreeSet<PathBuf>,
    /// Directory path -> is empty.
    directories: BTreeMap<PathBuf, bool>,
    archives: BTreeMap<PathBuf, ArchiveListing>,
}

impl FilesystemSnapshot {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        path == self.root || self.directories.contains_key(path)
    }

    /// File or directory present in the snapshot.
    pub fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    /// Regular files in path order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Directories with no entries, in path order.
    pub fn empty_directories(&self) -> impl Iterator<Item = &Path> {
        self.directories
            .iter()
            .filter(|(_, empty)| **empty)
            .map(|(p, _)| p.as_path())
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Member listing of an archive file, if the path is one.
    ///
    /// Every archive file has an entry; it is [`ArchiveListing::Unlisted`]
    /// when the scan skipped opening archives.
    pub fn archive(&self, path: &Path) -> Option<&ArchiveListing> {
        self.archives.get(path)
    }
}

/// Walks a storage root into a [`FilesystemSnapshot`].
#[derive(Debug, Clone)]
pub struct FilesystemScanner {
    root: PathBuf,
    list_archives: bool,
}

impl FilesystemScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            list_archives: true,
        }
    }

    /// Skip opening archives; their membership is then reported as unknown.
    pub fn without_archive_listing(mut self) -> Self {
        self.list_archives = false;
        self
    }

    /// Walk the whole tree once.
    ///
    /// A walk error aborts the scan: a partially read tree would turn every
    /// unread file into a false orphan.
    pub fn scan(&self) -> Result<FilesystemSnapshot> {
        if !self.root.is_dir() {
            return Err(GalleriaError::Config {
                message: format!("Storage root is not a directory: {}", self.root.display()),
            });
        }

        info!("Scanning storage root {}", self.root.display());

        let mut files = BTreeSet::new();
        let mut directories = BTreeMap::new();
        let mut child_counts: BTreeMap<PathBuf, usize> = BTreeMap::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path().to_path_buf();

            if let Some(parent) = path.parent() {
                *child_counts.entry(parent.to_path_buf()).or_default() += 1;
            }

            if entry.file_type().is_dir() {
                directories.insert(path, false);
            } else {
                files.insert(path);
            }
        }

        for (dir, empty) in directories.iter_mut() {
            *empty = child_counts.get(dir).copied().unwrap_or(0) == 0;
        }

        let mut archives = BTreeMap::new();
        for file in files.iter().filter(|f| is_archive_path(f)) {
            let listing = if !self.list_archives {
                ArchiveListing::Unlisted
            } else {
                match list_members(file) {
                    Ok(members) => ArchiveListing::Members(members),
                    Err(e) => {
                        warn!("Unreadable archive {}: {}", file.display(), e);
                        ArchiveListing::Unreadable(e.to_string())
                    }
                }
            };
            archives.insert(file.clone(), listing);
        }

        debug!(
            "Scanned {} files, {} directories, {} archives",
            files.len(),
            directories.len(),
            archives.len()
        );

        Ok(FilesystemSnapshot {
            root: self.root.clone(),
            files,
            directories,
            archives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{create_archive, ArchiveMember};
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_files_and_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("10/1/p_0.png"));
        std::fs::create_dir_all(root.join("10/2")).unwrap();

        let snapshot = FilesystemScanner::new(root).scan().unwrap();

        assert!(snapshot.is_file(&root.join("10/1/p_0.png")));
        assert!(snapshot.is_dir(&root.join("10/1")));
        assert!(snapshot.exists(&root.join("10")));
        let expected = root.join("10/2");
        let empty: Vec<_> = snapshot.empty_directories().collect();
        assert_eq!(empty, vec![expected.as_path()]);
        assert_eq!(snapshot.file_count(), 1);
        assert_eq!(snapshot.directory_count(), 3);
    }

    #[test]
    fn test_scan_lists_archive_members() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let page = root.join("staging/p_0.png");
        touch(&page);
        create_archive(
            &root.join("10/1.zip"),
            &[ArchiveMember {
                source: page,
                name: "p_0.png".into(),
            }],
        )
        .unwrap();
        touch(&root.join("10/bad.zip"));

        let snapshot = FilesystemScanner::new(root).scan().unwrap();

        let listing = snapshot.archive(&root.join("10/1.zip")).unwrap();
        assert!(listing.contains("p_0.png"));
        assert!(matches!(
            snapshot.archive(&root.join("10/bad.zip")),
            Some(ArchiveListing::Unreadable(_))
        ));
    }

    #[test]
    fn test_scan_without_archive_listing() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("1.zip"));
        let snapshot = FilesystemScanner::new(tmp.path())
            .without_archive_listing()
            .scan()
            .unwrap();
        assert_eq!(
            snapshot.archive(&tmp.path().join("1.zip")),
            Some(&ArchiveListing::Unlisted)
        );
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let result = FilesystemScanner::new(tmp.path().join("absent")).scan();
        assert!(matches!(result, Err(GalleriaError::Config { .. })));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("b/2.png"));
        touch(&tmp.path().join("a/1.png"));
        let first = FilesystemScanner::new(tmp.path()).scan().unwrap();
        let second = FilesystemScanner::new(tmp.path()).scan().unwrap();
        assert_eq!(first, second);
    }
}
