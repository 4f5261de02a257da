//! Error types for the reconciliation engine.
//!
//! Errors are grouped the way an operator reads them: structural catalog
//! problems, planning preconditions, filesystem and catalog failures, and
//! cancellation. Every variant that concerns one artifact carries its id so
//! the caller can log it before the process exits.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the galleria engine.
#[derive(Debug, Error)]
pub enum GalleriaError {
    // Catalog structure
    #[error("Catalog schema error in table {table}: {message}")]
    Schema { table: String, message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Planning preconditions
    #[error("[{artifact_id}] precondition failed: {message}")]
    Precondition { artifact_id: i64, message: String },

    #[error("[{artifact_id}] target already exists: {path}")]
    Collision { artifact_id: i64, path: PathBuf },

    #[error("Unsupported migration from {from} to {to}")]
    UnsupportedMigration { from: String, to: String },

    // Report consumption
    #[error("Report entry no longer exists: {path}")]
    StaleReport { path: PathBuf },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Archive error at {path:?}: {message}")]
    Archive {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation cancelled before the next artifact group")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for galleria operations.
pub type Result<T> = std::result::Result<T, GalleriaError>;

impl From<std::io::Error> for GalleriaError {
    fn from(err: std::io::Error) -> Self {
        GalleriaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for GalleriaError {
    fn from(err: serde_json::Error) -> Self {
        GalleriaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for GalleriaError {
    fn from(err: rusqlite::Error) -> Self {
        GalleriaError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<zip::result::ZipError> for GalleriaError {
    fn from(err: zip::result::ZipError) -> Self {
        GalleriaError::Archive {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<walkdir::Error> for GalleriaError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let message = err.to_string();
        GalleriaError::Io {
            message,
            path,
            source: err.into_io_error(),
        }
    }
}

impl GalleriaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GalleriaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an archive error with path context.
    pub fn archive_with_path(err: zip::result::ZipError, path: impl Into<PathBuf>) -> Self {
        GalleriaError::Archive {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub fn precondition(artifact_id: i64, message: impl Into<String>) -> Self {
        GalleriaError::Precondition {
            artifact_id,
            message: message.into(),
        }
    }

    /// Planning-time failures that abort a whole migration run.
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            GalleriaError::Precondition { .. }
                | GalleriaError::Collision { .. }
                | GalleriaError::UnsupportedMigration { .. }
                | GalleriaError::StaleReport { .. }
        )
    }

    /// The artifact this error is about, if any.
    pub fn artifact_id(&self) -> Option<i64> {
        match self {
            GalleriaError::Precondition { artifact_id, .. }
            | GalleriaError::Collision { artifact_id, .. } => Some(*artifact_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GalleriaError::precondition(42, "recorded path does not resolve");
        assert_eq!(
            err.to_string(),
            "[42] precondition failed: recorded path does not resolve"
        );
    }

    #[test]
    fn test_fatal_preconditions() {
        assert!(GalleriaError::Collision {
            artifact_id: 1,
            path: PathBuf::from("10/1.zip"),
        }
        .is_fatal_precondition());
        assert!(GalleriaError::StaleReport {
            path: PathBuf::from("gone.png")
        }
        .is_fatal_precondition());
        assert!(!GalleriaError::Cancelled.is_fatal_precondition());
    }

    #[test]
    fn test_artifact_id_exposed() {
        assert_eq!(GalleriaError::precondition(7, "x").artifact_id(), Some(7));
        assert_eq!(GalleriaError::Other("x".into()).artifact_id(), None);
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let err = GalleriaError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            "/tmp/x",
        );
        match err {
            GalleriaError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
