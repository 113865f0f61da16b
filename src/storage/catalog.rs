use chrono::{DateTime, Utc};
use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::db::{Database, DatabaseError};
use super::models::{Catalog, CatalogStats, ObjectRecord, Swap};
use super::tables::*;
use super::CatalogStore;

/// Everything in the catalog that is not a per-object row.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogMeta {
    last_sequence: u64,
    stats: CatalogStats,
    updated_at: DateTime<Utc>,
    revision: u64,
}

impl CatalogMeta {
    fn for_write(catalog: &Catalog, revision: u64) -> Self {
        Self {
            last_sequence: catalog.last_sequence,
            stats: catalog.stats,
            updated_at: Utc::now(),
            revision,
        }
    }
}

fn decode_meta(bytes: &[u8]) -> Result<CatalogMeta, DatabaseError> {
    rmp_serde::from_slice(bytes).map_err(|e| DatabaseError::Corrupt(format!("catalog meta: {e}")))
}

fn decode_record(id: &str, bytes: &[u8]) -> Result<ObjectRecord, DatabaseError> {
    rmp_serde::from_slice(bytes).map_err(|e| DatabaseError::Corrupt(format!("object {id}: {e}")))
}

impl Database {
    // ========================================================================
    // Catalog document
    // ========================================================================

    /// Read the whole catalog from one snapshot, or `None` if it was never
    /// written.
    fn read_catalog(&self) -> Result<Option<Catalog>, DatabaseError> {
        let read_txn = self.begin_read()?;

        let meta = {
            let table = read_txn.open_table(CATALOG_META)?;
            let result = match table.get(META_KEY)? {
                Some(data) => Some(decode_meta(data.value())?),
                None => None,
            };
            result
        };
        let Some(meta) = meta else {
            return Ok(None);
        };

        let mut catalog = Catalog {
            last_sequence: meta.last_sequence,
            stats: meta.stats,
            updated_at: meta.updated_at,
            revision: meta.revision,
            ..Catalog::default()
        };

        let objects = read_txn.open_table(OBJECTS)?;
        for result in objects.iter()? {
            let (key, value) = result?;
            let id = key.value().to_string();
            let record = decode_record(&id, value.value())?;
            catalog.objects.insert(id, record);
        }

        let hashes = read_txn.open_table(HASH_INDEX)?;
        for result in hashes.iter()? {
            let (key, value) = result?;
            catalog
                .hash_index
                .insert(key.value().to_string(), value.value().to_string());
        }

        if !catalog.is_consistent() {
            return Err(DatabaseError::Corrupt(
                "hash index does not match object records".to_string(),
            ));
        }

        Ok(Some(catalog))
    }

    fn stored_revision(write_txn: &WriteTransaction) -> Result<Option<u64>, DatabaseError> {
        let table = write_txn.open_table(CATALOG_META)?;
        let result = match table.get(META_KEY)? {
            Some(data) => Some(decode_meta(data.value())?.revision),
            None => None,
        };
        Ok(result)
    }

    /// True when the stored tables hold rows `catalog` no longer has.
    fn has_removals(
        write_txn: &WriteTransaction,
        catalog: &Catalog,
    ) -> Result<bool, DatabaseError> {
        let objects = write_txn.open_table(OBJECTS)?;
        let hashes = write_txn.open_table(HASH_INDEX)?;
        Ok(objects.len()? > catalog.objects.len() as u64
            || hashes.len()? > catalog.hash_index.len() as u64)
    }

    /// Insert the rows of `catalog` that are not stored yet, then the meta.
    ///
    /// Records are immutable once written, so when the stored revision
    /// matches the one `catalog` was loaded at, the missing rows are exactly
    /// what changed.
    fn append_catalog(
        write_txn: &WriteTransaction,
        catalog: &Catalog,
        meta: &CatalogMeta,
    ) -> Result<(), DatabaseError> {
        let mut added = 0usize;
        {
            let mut table = write_txn.open_table(OBJECTS)?;
            for record in catalog.objects.values() {
                let stored = table.get(record.id.as_str())?.is_some();
                if !stored {
                    let data = rmp_serde::to_vec_named(record)?;
                    table.insert(record.id.as_str(), data.as_slice())?;
                    added += 1;
                }
            }
        }

        {
            let mut table = write_txn.open_table(HASH_INDEX)?;
            for (hash, id) in &catalog.hash_index {
                let stored = table.get(hash.as_str())?.is_some();
                if !stored {
                    table.insert(hash.as_str(), id.as_str())?;
                }
            }
        }

        let mut table = write_txn.open_table(CATALOG_META)?;
        let data = rmp_serde::to_vec_named(meta)?;
        table.insert(META_KEY, data.as_slice())?;
        tracing::debug!(added, revision = meta.revision, "Appended to catalog");
        Ok(())
    }

    /// Replace every table's contents with `catalog` inside `write_txn`.
    fn write_catalog(
        write_txn: &WriteTransaction,
        catalog: &Catalog,
        meta: &CatalogMeta,
    ) -> Result<(), DatabaseError> {
        {
            let mut table = write_txn.open_table(OBJECTS)?;
            let stale: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|id| !catalog.objects.contains_key(id))
                .collect();
            for id in stale {
                table.remove(id.as_str())?;
            }
            for record in catalog.objects.values() {
                let data = rmp_serde::to_vec_named(record)?;
                table.insert(record.id.as_str(), data.as_slice())?;
            }
        }

        {
            let mut table = write_txn.open_table(HASH_INDEX)?;
            let stale: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|hash| !catalog.hash_index.contains_key(hash))
                .collect();
            for hash in stale {
                table.remove(hash.as_str())?;
            }
            for (hash, id) in &catalog.hash_index {
                table.insert(hash.as_str(), id.as_str())?;
            }
        }

        let mut table = write_txn.open_table(CATALOG_META)?;
        let data = rmp_serde::to_vec_named(meta)?;
        table.insert(META_KEY, data.as_slice())?;
        Ok(())
    }
}

impl CatalogStore for Database {
    fn load(&self) -> Result<Catalog, DatabaseError> {
        if let Some(catalog) = self.read_catalog()? {
            return Ok(catalog);
        }

        let write_txn = self.begin_write()?;
        if Self::stored_revision(&write_txn)?.is_some() {
            // Another caller created it between our read and write.
            write_txn.abort()?;
            return self
                .read_catalog()?
                .ok_or_else(|| DatabaseError::Corrupt("catalog disappeared".to_string()));
        }

        let mut catalog = Catalog::default();
        let meta = CatalogMeta::for_write(&catalog, 1);
        Self::write_catalog(&write_txn, &catalog, &meta)?;
        write_txn.commit()?;

        catalog.revision = meta.revision;
        catalog.updated_at = meta.updated_at;
        tracing::info!("Created empty catalog");
        Ok(catalog)
    }

    fn save(&self, catalog: &mut Catalog) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        let stored = Self::stored_revision(&write_txn)?.unwrap_or(0);
        let meta = CatalogMeta::for_write(catalog, stored.max(catalog.revision) + 1);
        Self::write_catalog(&write_txn, catalog, &meta)?;
        write_txn.commit()?;

        catalog.revision = meta.revision;
        catalog.updated_at = meta.updated_at;
        Ok(())
    }

    fn compare_and_swap(&self, catalog: &mut Catalog) -> Result<Swap, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stored = Self::stored_revision(&write_txn)?.unwrap_or(0);
        if stored != catalog.revision {
            write_txn.abort()?;
            return Ok(Swap::Conflict);
        }

        let meta = CatalogMeta::for_write(catalog, stored + 1);
        if Self::has_removals(&write_txn, catalog)? {
            Self::write_catalog(&write_txn, catalog, &meta)?;
        } else {
            Self::append_catalog(&write_txn, catalog, &meta)?;
        }
        write_txn.commit()?;

        catalog.revision = meta.revision;
        catalog.updated_at = meta.updated_at;
        Ok(Swap::Committed)
    }

    fn lookup_id(&self, id: &str) -> Result<Option<ObjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(decode_record(id, data.value())?)),
            None => Ok(None),
        }
    }

    fn lookup_hash(&self, hash: &str) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(HASH_INDEX)?;
        let result = table.get(hash)?.map(|data| data.value().to_string());
        Ok(result)
    }

    fn stats(&self) -> Result<CatalogStats, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CATALOG_META)?;
        let result = match table.get(META_KEY)? {
            Some(data) => decode_meta(data.value())?.stats,
            None => CatalogStats::default(),
        };
        Ok(result)
    }
}
