//! Shared fixture: a catalog file plus a storage root in one temp dir.

#![allow(dead_code)]

use galleria_core::archive::{create_archive, ArchiveMember};
use galleria_core::{
    CatalogSchema, CatalogStore, Galleria, LayoutConfig, MasterRecord, PageRecord,
    PathCanonicalizer,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Fixture {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub db: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let root = tmp.path().join("downloads");
        std::fs::create_dir_all(&root).unwrap();
        let db = tmp.path().join("db.sqlite");
        // Create the tables once; tests reopen through `catalog()`.
        CatalogStore::create(&db, CatalogSchema::default()).unwrap();
        Self { tmp, root, db }
    }

    pub fn catalog(&self) -> CatalogStore {
        CatalogStore::open(&self.db, CatalogSchema::default()).unwrap()
    }

    pub fn engine(&self) -> Galleria {
        Galleria::builder(&self.db, &self.root).build().unwrap()
    }

    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig::new(&self.root)
    }

    pub fn canonicalizer(&self) -> PathCanonicalizer {
        PathCanonicalizer::default()
    }

    /// Write a file under the storage root.
    pub fn file(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn master(&self, id: i64, owner: i64, path: &str) {
        self.catalog()
            .insert_master(&MasterRecord::new(id, owner, path))
            .unwrap();
    }

    pub fn page(&self, id: i64, sequence: i64, path: &str) {
        self.catalog()
            .insert_page(&PageRecord::new(id, sequence, path))
            .unwrap();
    }

    /// A flat-layout artifact `<owner>/<id>` with `pages` files on disk.
    pub fn flat_artifact(&self, id: i64, owner: i64, pages: usize) {
        let dir = format!("{}/{}", owner, id);
        self.master(id, owner, &dir);
        for seq in 0..pages {
            let page = format!("{}/p_{}.png", dir, seq);
            self.file(&page);
            self.page(id, seq as i64, &page);
        }
    }

    /// A nested-layout artifact `{<owner>} artist/{<id>} work` with its
    /// master recorded as that directory.
    pub fn nested_artifact(&self, id: i64, owner: i64, pages: usize) -> String {
        let dir = format!("{{{}}} artist/{{{}}} work", owner, id);
        self.master(id, owner, &dir);
        for seq in 0..pages {
            let page = format!("{}/p_{}.png", dir, seq);
            self.file(&page);
            self.page(id, seq as i64, &page);
        }
        dir
    }

    /// Write a real zip archive under the storage root.
    pub fn zip_file(&self, relative: &str, members: &[&str]) -> PathBuf {
        let staging = self.tmp.path().join("staging");
        let members: Vec<ArchiveMember> = members
            .iter()
            .map(|name| {
                let source = staging.join(name);
                std::fs::create_dir_all(&staging).unwrap();
                std::fs::write(&source, name.as_bytes()).unwrap();
                ArchiveMember {
                    source,
                    name: name.to_string(),
                }
            })
            .collect();
        let target = self.root.join(relative);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        create_archive(&target, &members).unwrap();
        std::fs::remove_dir_all(&staging).unwrap();
        target
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }
}

pub fn sorted_members(archive: &Path) -> Vec<String> {
    galleria_core::archive::list_members(archive)
        .unwrap()
        .into_iter()
        .collect()
}
