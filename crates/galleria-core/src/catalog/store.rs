//! SQLite-backed access to the artwork catalog.

use super::records::{CatalogContents, ConsistencyReport, MasterRecord, PageRecord};
use crate::config::{CatalogConfig, CatalogSchema};
use crate::{GalleriaError, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Rows removed by [`CatalogStore::purge_artifact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub pages: usize,
    pub masters: usize,
    pub tag_links: usize,
}

/// Typed access to master, page and tag-link rows.
///
/// The store is the only component that writes to the catalog. Each mutating
/// method runs in its own transaction and is committed before it returns.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    schema: CatalogSchema,
    has_tag_links: bool,
}

impl CatalogStore {
    /// Open an existing catalog and validate its structure.
    ///
    /// Fails with [`GalleriaError::Schema`] before anything is read if a
    /// required table or column is missing.
    pub fn open(db_path: &Path, schema: CatalogSchema) -> Result<Self> {
        if !db_path.is_file() {
            return Err(GalleriaError::Config {
                message: format!("Catalog database does not exist: {}", db_path.display()),
            });
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure_connection(&conn)?;
        // Forces SQLite to actually read the header, rejecting non-database files.
        conn.query_row("SELECT 1", [], |_| Ok(()))?;

        let has_tag_links = Self::validate_schema(&conn, &schema)?;
        info!("Opened catalog at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            schema,
            has_tag_links,
        })
    }

    /// Create (or open) a catalog, creating missing tables.
    pub fn create(db_path: &Path, schema: CatalogSchema) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GalleriaError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn, &schema)?;
        let has_tag_links = Self::validate_schema(&conn, &schema)?;

        Ok(Self {
            conn: Mutex::new(conn),
            schema,
            has_tag_links,
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.busy_timeout(Duration::from_millis(u64::from(
            CatalogConfig::BUSY_TIMEOUT_MS,
        )))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection, s: &CatalogSchema) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {master} (
                {id} INTEGER PRIMARY KEY,
                {owner} INTEGER,
                {title} TEXT,
                {path} TEXT
            );

            CREATE TABLE IF NOT EXISTS {page} (
                {id} INTEGER NOT NULL,
                {seq} INTEGER NOT NULL,
                {path} TEXT,
                PRIMARY KEY ({id}, {seq})
            );

            CREATE TABLE IF NOT EXISTS {tag} (
                {id} INTEGER NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY ({id}, tag_id)
            );",
            master = quote(&s.master_table),
            page = quote(&s.page_table),
            tag = quote(&s.tag_link_table),
            id = quote(&s.artifact_id_column),
            owner = quote(&s.owner_id_column),
            title = quote(&s.title_column),
            path = quote(&s.path_column),
            seq = quote(&s.sequence_column),
        ))?;
        Ok(())
    }

    /// Check required tables and columns; returns whether the optional
    /// tag-link table is present.
    fn validate_schema(conn: &Connection, s: &CatalogSchema) -> Result<bool> {
        let required = [
            (
                &s.master_table,
                vec![&s.artifact_id_column, &s.owner_id_column, &s.path_column],
            ),
            (
                &s.page_table,
                vec![&s.artifact_id_column, &s.sequence_column, &s.path_column],
            ),
        ];

        for (table, columns) in required {
            let present = table_columns(conn, table)?;
            if present.is_empty() {
                return Err(GalleriaError::Schema {
                    table: table.clone(),
                    message: "table does not exist".to_string(),
                });
            }
            for column in columns {
                if !present.iter().any(|c| c == column) {
                    return Err(GalleriaError::Schema {
                        table: table.clone(),
                        message: format!("required column {} is missing", column),
                    });
                }
            }
        }

        let tag_columns = table_columns(conn, &s.tag_link_table)?;
        let has_tag_links = tag_columns.iter().any(|c| c == &s.artifact_id_column);
        if !has_tag_links {
            debug!("Tag link table {} not present", s.tag_link_table);
        }
        Ok(has_tag_links)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| GalleriaError::Database {
            message: "Failed to acquire catalog connection lock".to_string(),
            source: None,
        })
    }

    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    // ========================================
    // Reads
    // ========================================

    /// All master records in ascending artifact id order.
    pub fn masters(&self) -> Result<Vec<MasterRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {id}, {owner}, {title}, {path} FROM {master} ORDER BY {id} ASC",
            id = quote(&self.schema.artifact_id_column),
            owner = quote(&self.schema.owner_id_column),
            title = self.title_select(&conn)?,
            path = quote(&self.schema.path_column),
            master = quote(&self.schema.master_table),
        ))?;

        let rows = stmt.query_map([], master_from_row)?;
        let mut masters = Vec::new();
        for row in rows {
            masters.push(row?);
        }
        Ok(masters)
    }

    /// One master record by artifact id.
    pub fn master(&self, artifact_id: i64) -> Result<Option<MasterRecord>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {id}, {owner}, {title}, {path} FROM {master} WHERE {id} = ?1",
            id = quote(&self.schema.artifact_id_column),
            owner = quote(&self.schema.owner_id_column),
            title = self.title_select(&conn)?,
            path = quote(&self.schema.path_column),
            master = quote(&self.schema.master_table),
        );
        let record = conn
            .query_row(&sql, params![artifact_id], master_from_row)
            .optional()?;
        Ok(record)
    }

    /// Page records of one artifact in sequence order.
    pub fn pages(&self, artifact_id: i64) -> Result<Vec<PageRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {id}, {seq}, {path} FROM {page} WHERE {id} = ?1 ORDER BY {seq} ASC",
            id = quote(&self.schema.artifact_id_column),
            seq = quote(&self.schema.sequence_column),
            path = quote(&self.schema.path_column),
            page = quote(&self.schema.page_table),
        ))?;

        let rows = stmt.query_map(params![artifact_id], page_from_row)?;
        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    /// Read both tables in one pass.
    pub fn load_all(&self) -> Result<CatalogContents> {
        let masters = self.masters()?;

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {id}, {seq}, {path} FROM {page} ORDER BY {id} ASC, {seq} ASC",
            id = quote(&self.schema.artifact_id_column),
            seq = quote(&self.schema.sequence_column),
            path = quote(&self.schema.path_column),
            page = quote(&self.schema.page_table),
        ))?;

        let mut pages: BTreeMap<i64, Vec<PageRecord>> = BTreeMap::new();
        for row in stmt.query_map([], page_from_row)? {
            let page = row?;
            pages.entry(page.artifact_id).or_default().push(page);
        }

        debug!(
            "Loaded {} masters and {} page groups",
            masters.len(),
            pages.len()
        );
        Ok(CatalogContents { masters, pages })
    }

    /// Masters without pages and pages without a master.
    pub fn consistency(&self) -> Result<ConsistencyReport> {
        let conn = self.lock_conn()?;
        let id = quote(&self.schema.artifact_id_column);
        let master = quote(&self.schema.master_table);
        let page = quote(&self.schema.page_table);

        let masters_without_pages = collect_ids(
            &conn,
            &format!(
                "SELECT m.{id} FROM {master} m
                 WHERE NOT EXISTS (SELECT 1 FROM {page} p WHERE p.{id} = m.{id})
                 ORDER BY m.{id} ASC"
            ),
        )?;
        let pages_without_master = collect_ids(
            &conn,
            &format!(
                "SELECT DISTINCT p.{id} FROM {page} p
                 WHERE NOT EXISTS (SELECT 1 FROM {master} m WHERE m.{id} = p.{id})
                 ORDER BY p.{id} ASC"
            ),
        )?;

        Ok(ConsistencyReport {
            masters_without_pages,
            pages_without_master,
        })
    }

    // ========================================
    // Writes
    // ========================================

    /// Insert a master record.
    pub fn insert_master(&self, record: &MasterRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {master} ({id}, {owner}, {title}, {path}) VALUES (?1, ?2, ?3, ?4)",
                master = quote(&self.schema.master_table),
                id = quote(&self.schema.artifact_id_column),
                owner = quote(&self.schema.owner_id_column),
                title = quote(&self.schema.title_column),
                path = quote(&self.schema.path_column),
            ),
            params![
                record.artifact_id,
                record.owner_id,
                record.title,
                record.recorded_path
            ],
        )?;
        Ok(())
    }

    /// Insert a page record.
    pub fn insert_page(&self, record: &PageRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {page} ({id}, {seq}, {path}) VALUES (?1, ?2, ?3)",
                page = quote(&self.schema.page_table),
                id = quote(&self.schema.artifact_id_column),
                seq = quote(&self.schema.sequence_column),
                path = quote(&self.schema.path_column),
            ),
            params![
                record.artifact_id,
                record.sequence_number,
                record.recorded_path
            ],
        )?;
        Ok(())
    }

    /// Link an artifact to a tag.
    pub fn insert_tag_link(&self, artifact_id: i64, tag_id: &str) -> Result<()> {
        if !self.has_tag_links {
            return Err(GalleriaError::Schema {
                table: self.schema.tag_link_table.clone(),
                message: "table does not exist".to_string(),
            });
        }
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {tag} ({id}, tag_id) VALUES (?1, ?2)",
                tag = quote(&self.schema.tag_link_table),
                id = quote(&self.schema.artifact_id_column),
            ),
            params![artifact_id, tag_id],
        )?;
        Ok(())
    }

    /// Number of tag links held by an artifact.
    pub fn tag_link_count(&self, artifact_id: i64) -> Result<usize> {
        if !self.has_tag_links {
            return Ok(0);
        }
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {tag} WHERE {id} = ?1",
                tag = quote(&self.schema.tag_link_table),
                id = quote(&self.schema.artifact_id_column),
            ),
            params![artifact_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Re-point one page. Committed immediately.
    pub fn update_page_path(&self, artifact_id: i64, sequence: i64, path: &str) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            &format!(
                "UPDATE {page} SET {path} = ?1 WHERE {id} = ?2 AND {seq} = ?3",
                page = quote(&self.schema.page_table),
                path = quote(&self.schema.path_column),
                id = quote(&self.schema.artifact_id_column),
                seq = quote(&self.schema.sequence_column),
            ),
            params![path, artifact_id, sequence],
        )?;
        if rows != 1 {
            return Err(GalleriaError::Database {
                message: format!(
                    "[{}] expected one page row for sequence {}, updated {}",
                    artifact_id, sequence, rows
                ),
                source: None,
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Re-point a master record. Committed immediately.
    pub fn update_master_path(&self, artifact_id: i64, path: &str) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            &format!(
                "UPDATE {master} SET {path} = ?1 WHERE {id} = ?2",
                master = quote(&self.schema.master_table),
                path = quote(&self.schema.path_column),
                id = quote(&self.schema.artifact_id_column),
            ),
            params![path, artifact_id],
        )?;
        if rows != 1 {
            return Err(GalleriaError::Database {
                message: format!("[{}] expected one master row, updated {}", artifact_id, rows),
                source: None,
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete every row belonging to an artifact in one transaction.
    pub fn purge_artifact(&self, artifact_id: i64) -> Result<PurgeCounts> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let id = quote(&self.schema.artifact_id_column);

        let pages = tx.execute(
            &format!(
                "DELETE FROM {} WHERE {id} = ?1",
                quote(&self.schema.page_table)
            ),
            params![artifact_id],
        )?;
        let masters = tx.execute(
            &format!(
                "DELETE FROM {} WHERE {id} = ?1",
                quote(&self.schema.master_table)
            ),
            params![artifact_id],
        )?;
        let tag_links = if self.has_tag_links {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {id} = ?1",
                    quote(&self.schema.tag_link_table)
                ),
                params![artifact_id],
            )?
        } else {
            0
        };
        tx.commit()?;

        debug!(
            "[{}] purged {} pages, {} masters, {} tag links",
            artifact_id, pages, masters, tag_links
        );
        Ok(PurgeCounts {
            pages,
            masters,
            tag_links,
        })
    }

    /// The title column is optional in older catalogs.
    fn title_select(&self, conn: &Connection) -> Result<String> {
        let columns = table_columns(conn, &self.schema.master_table)?;
        if columns.iter().any(|c| c == &self.schema.title_column) {
            Ok(quote(&self.schema.title_column))
        } else {
            Ok("NULL".to_string())
        }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

fn collect_ids(conn: &Connection, sql: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn master_from_row(row: &Row<'_>) -> rusqlite::Result<MasterRecord> {
    Ok(MasterRecord {
        artifact_id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        recorded_path: row.get(3)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        artifact_id: row.get(0)?,
        sequence_number: row.get(1)?,
        recorded_path: row.get(2)?,
    })
}
