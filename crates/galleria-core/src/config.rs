//! Centralized configuration for the galleria engine.
//!
//! Fixed tuning values live in constant-only unit structs. Values an operator
//! may change per run (table names, storage layout) are plain structs with a
//! `Default` matching the downloader's historical catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine-wide constants.
pub struct EngineConfig;

impl EngineConfig {
    pub const APP_NAME: &'static str = "galleria";
    /// Seconds an operator has to abort before a destructive run starts.
    pub const COMMIT_COUNTDOWN: Duration = Duration::from_secs(20);
    pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
}

/// Catalog connection settings.
pub struct CatalogConfig;

impl CatalogConfig {
    pub const BUSY_TIMEOUT_MS: u32 = 5_000;
}

/// File names and extensions used on disk.
pub struct PathsConfig;

impl PathsConfig {
    pub const REPORT_FILENAME: &'static str = "validation_result.json";
    pub const ARCHIVE_EXTENSION: &'static str = "zip";
    pub const TEMP_SUFFIX: &'static str = ".part";
}

/// Table and column names of the catalog.
///
/// Only the names differ between catalogs; the engine relies on the column
/// semantics, never on positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSchema {
    pub master_table: String,
    pub page_table: String,
    pub tag_link_table: String,
    pub artifact_id_column: String,
    pub owner_id_column: String,
    pub title_column: String,
    pub path_column: String,
    pub sequence_column: String,
}

impl Default for CatalogSchema {
    fn default() -> Self {
        Self {
            master_table: "pixiv_master_image".to_string(),
            page_table: "pixiv_manga_image".to_string(),
            tag_link_table: "pixiv_image_to_tag".to_string(),
            artifact_id_column: "image_id".to_string(),
            owner_id_column: "member_id".to_string(),
            title_column: "title".to_string(),
            path_column: "save_name".to_string(),
            sequence_column: "page".to_string(),
        }
    }
}

/// Storage root and naming of artifact directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    pub root: PathBuf,
    /// Prepended to the artifact id in flat layouts (`<owner>/<prefix><id>`).
    pub artifact_dir_prefix: String,
}

impl LayoutConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            artifact_dir_prefix: String::new(),
        }
    }

    pub fn with_artifact_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.artifact_dir_prefix = prefix.into();
        self
    }

    /// Resolve a recorded path against the storage root.
    ///
    /// Absolute recorded paths are returned unchanged.
    pub fn resolve(&self, recorded: &str) -> PathBuf {
        self.root.join(recorded)
    }

    /// Root-relative directory of an artifact in the flat layout.
    pub fn flat_artifact_dir(&self, owner_id: i64, artifact_id: i64) -> PathBuf {
        Path::new(&owner_id.to_string()).join(format!("{}{}", self.artifact_dir_prefix, artifact_id))
    }

    /// Root-relative archive path of an artifact in the archive layout.
    pub fn archive_path(&self, owner_id: i64, artifact_id: i64) -> PathBuf {
        Path::new(&owner_id.to_string()).join(format!(
            "{}{}.{}",
            self.artifact_dir_prefix,
            artifact_id,
            PathsConfig::ARCHIVE_EXTENSION
        ))
    }

    /// Render a root-relative path the way the catalog records it.
    ///
    /// `absolute` follows the style of the path being replaced.
    pub fn record(&self, relative: &Path, absolute: bool) -> String {
        if absolute {
            self.root.join(relative).to_string_lossy().into_owned()
        } else {
            relative.to_string_lossy().into_owned()
        }
    }
}
