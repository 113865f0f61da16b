use redb::TableDefinition;

/// Object records: id -> ObjectRecord (msgpack)
pub const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Content index: sha-256 hex -> id (dedup lookups)
pub const HASH_INDEX: TableDefinition<&str, &str> = TableDefinition::new("hash_index");

/// Catalog-wide counters and revision, under a single key (msgpack)
pub const CATALOG_META: TableDefinition<&str, &[u8]> = TableDefinition::new("catalog_meta");

pub const META_KEY: &str = "catalog";
