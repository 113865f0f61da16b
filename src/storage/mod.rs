pub mod db;
mod catalog;
mod json;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use json::JsonCatalog;
pub use models::{Catalog, CatalogStats, ObjectRecord, Swap};
pub use tables::*;

/// Persistent home of the catalog.
///
/// The catalog is read and written as one document. `save` is
/// last-writer-wins; `compare_and_swap` only writes when nobody else has
/// persisted since the catalog was loaded. Both are atomic with respect to
/// concurrent `load` calls, across processes sharing the same data directory.
pub trait CatalogStore: Send + Sync {
    /// Return the current catalog, creating and persisting an empty one if
    /// none exists yet.
    fn load(&self) -> Result<Catalog, DatabaseError>;

    /// Persist unconditionally. Stamps `updated_at` and bumps `revision`.
    fn save(&self, catalog: &mut Catalog) -> Result<(), DatabaseError>;

    /// Persist only if the stored revision equals `catalog.revision`.
    fn compare_and_swap(&self, catalog: &mut Catalog) -> Result<Swap, DatabaseError>;

    /// Point read by identifier. Never creates anything.
    fn lookup_id(&self, id: &str) -> Result<Option<ObjectRecord>, DatabaseError>;

    /// Point read by content hash. Never creates anything.
    fn lookup_hash(&self, hash: &str) -> Result<Option<String>, DatabaseError>;

    /// Aggregate counters, zero if the catalog was never written. Never
    /// creates anything.
    fn stats(&self) -> Result<CatalogStats, DatabaseError>;
}
