//! Per-artifact zip archives.
//!
//! Archives are assembled in a temp file next to the target and persisted
//! without clobbering, so the target path either does not exist or holds a
//! complete archive.

use crate::config::PathsConfig;
use crate::{GalleriaError, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One file to store in an archive under a flat member name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub source: PathBuf,
    pub name: String,
}

/// Whether a path names an archive by extension.
pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(PathsConfig::ARCHIVE_EXTENSION))
        .unwrap_or(false)
}

/// Whether a master resolved to `master` keeps its pages as archive members.
///
/// Archive pages are recorded as bare member names that do not exist on
/// disk. A single-file artifact whose own file still carries the archive
/// extension records its page under the master path, or under a path that
/// resolves on disk, and is treated as a plain file.
pub fn holds_pages<'a, I, F>(master: &Path, master_recorded: &str, pages: I, mut on_disk: F) -> bool
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&str) -> bool,
{
    is_archive_path(master)
        && pages
            .into_iter()
            .all(|page| page != master_recorded && !on_disk(page))
}

/// Names of all members stored in an archive.
pub fn list_members(path: &Path) -> Result<BTreeSet<String>> {
    let file = File::open(path).map_err(|e| GalleriaError::io_with_path(e, path))?;
    let archive =
        ZipArchive::new(file).map_err(|e| GalleriaError::archive_with_path(e, path))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Create an archive at `target` holding `members`.
///
/// Fails without touching `target` if it already exists.
pub fn create_archive(target: &Path, members: &[ArchiveMember]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| GalleriaError::Config {
        message: format!("Archive path has no parent: {}", target.display()),
    })?;
    std::fs::create_dir_all(dir).map_err(|e| GalleriaError::io_with_path(e, dir))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".galleria-")
        .suffix(PathsConfig::TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| GalleriaError::io_with_path(e, dir))?;

    {
        let mut writer = ZipWriter::new(temp.as_file_mut());
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for member in members {
            let mut source = File::open(&member.source)
                .map_err(|e| GalleriaError::io_with_path(e, &member.source))?;
            writer
                .start_file(member.name.as_str(), options)
                .map_err(|e| GalleriaError::archive_with_path(e, target))?;
            io::copy(&mut source, &mut writer)
                .map_err(|e| GalleriaError::io_with_path(e, &member.source))?;
            debug!("Added {} as {}", member.source.display(), member.name);
        }

        writer
            .finish()
            .map_err(|e| GalleriaError::archive_with_path(e, target))?;
    }

    temp.as_file()
        .sync_all()
        .map_err(|e| GalleriaError::io_with_path(e, target))?;
    temp.persist_noclobber(target)
        .map_err(|e| GalleriaError::io_with_path(e.error, target))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_create_and_list() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("src/a/p_0.png");
        let b = tmp.path().join("src/b/p_1.png");
        write_file(&a, "zero");
        write_file(&b, "one");

        let target = tmp.path().join("out/1.zip");
        create_archive(
            &target,
            &[
                ArchiveMember {
                    source: a,
                    name: "p_0.png".into(),
                },
                ArchiveMember {
                    source: b,
                    name: "p_1.png".into(),
                },
            ],
        )
        .unwrap();

        let members = list_members(&target).unwrap();
        assert_eq!(
            members.into_iter().collect::<Vec<_>>(),
            vec!["p_0.png".to_string(), "p_1.png".to_string()]
        );
    }

    #[test]
    fn test_create_refuses_existing_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("1.zip");
        write_file(&target, "occupied");

        let result = create_archive(&target, &[]);
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "occupied");
    }

    #[test]
    fn test_missing_source_leaves_no_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("1.zip");
        let result = create_archive(
            &target,
            &[ArchiveMember {
                source: tmp.path().join("missing.png"),
                name: "missing.png".into(),
            }],
        );
        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_list_members_rejects_non_archive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.zip");
        write_file(&path, "not a zip");
        assert!(matches!(
            list_members(&path),
            Err(GalleriaError::Archive { .. })
        ));
    }

    #[test]
    fn test_is_archive_path() {
        assert!(is_archive_path(Path::new("10/1.zip")));
        assert!(is_archive_path(Path::new("10/1.ZIP")));
        assert!(!is_archive_path(Path::new("10/1")));
        assert!(!is_archive_path(Path::new("10/1.gif")));
    }

    #[test]
    fn test_holds_pages_needs_member_names() {
        let master = Path::new("/lib/10/1.zip");
        assert!(holds_pages(master, "10/1.zip", ["p_0.png", "p_1.png"], |_| false));
        assert!(!holds_pages(Path::new("/lib/10/1"), "10/1", ["p_0.png"], |_| false));
    }

    #[test]
    fn test_single_file_with_archive_extension_is_not_a_container() {
        let master = Path::new("/lib/10/7/ugoira.zip");
        assert!(!holds_pages(
            master,
            "10/7/ugoira.zip",
            ["10/7/ugoira.zip"],
            |_| true
        ));
        // Page row differs from the master path but exists on disk.
        assert!(!holds_pages(
            master,
            "/lib/10/7/ugoira.zip",
            ["10/7/ugoira.zip"],
            |p| p == "10/7/ugoira.zip"
        ));
    }
}
