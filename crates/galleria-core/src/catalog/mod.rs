//! Catalog of downloaded artifacts.
//!
//! The catalog holds:
//! - **Master records**: one row per artifact (owner, recorded storage path)
//! - **Page records**: one row per constituent file, keyed by (artifact, page)
//! - **Tag links**: optional, removed together with a purged artifact
//!
//! [`CatalogStore`] owns every read and write. Other components consume the
//! structured records in [`records`] and request mutations through the store.

pub mod records;
pub mod store;

pub use records::{CatalogContents, ConsistencyReport, MasterRecord, PageRecord};
pub use store::{CatalogStore, PurgeCounts};
