//! Single-file JSON catalog, the `mappings.json` layout.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs4::FileExt;
use tempfile::NamedTempFile;

use super::db::DatabaseError;
use super::models::{Catalog, CatalogStats, ObjectRecord, Swap};
use super::CatalogStore;

/// Catalog persisted as one pretty-printed JSON document.
///
/// Writers hold an exclusive lock on `mappings.json.lock` across the whole
/// read-compare-write, so every `JsonCatalog` on the same directory (in this
/// process or another) sees a single writer at a time. The document itself
/// is replaced by renaming a synced temp file over it; readers never lock and
/// see either the old or the new version.
pub struct JsonCatalog {
    dir: PathBuf,
    lock_path: PathBuf,
    path: PathBuf,
}

impl JsonCatalog {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            lock_path: dir.join("mappings.json.lock"),
            path: dir.join("mappings.json"),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until this caller is the only writer. Released when the
    /// returned handle is dropped.
    fn lock(&self) -> Result<File, DatabaseError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    }

    fn read_document(&self) -> Result<Option<Catalog>, DatabaseError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let catalog: Catalog = serde_json::from_slice(&raw)
            .map_err(|e| DatabaseError::Corrupt(format!("{}: {e}", self.path.display())))?;
        if !catalog.is_consistent() {
            return Err(DatabaseError::Corrupt(format!(
                "{}: hash index does not match object records",
                self.path.display()
            )));
        }
        Ok(Some(catalog))
    }

    /// Caller must hold the writer lock.
    fn write_document(&self, catalog: &Catalog) -> Result<(), DatabaseError> {
        let data = serde_json::to_vec_pretty(catalog)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    /// Write `catalog` as revision `revision`, updating it only on success.
    fn persist(&self, catalog: &mut Catalog, revision: u64) -> Result<(), DatabaseError> {
        let mut next = catalog.clone();
        next.revision = revision;
        next.updated_at = Utc::now();
        self.write_document(&next)?;
        *catalog = next;
        Ok(())
    }

    fn stored_revision(&self) -> Result<u64, DatabaseError> {
        Ok(self.read_document()?.map(|c| c.revision).unwrap_or(0))
    }
}

impl CatalogStore for JsonCatalog {
    fn load(&self) -> Result<Catalog, DatabaseError> {
        if let Some(catalog) = self.read_document()? {
            return Ok(catalog);
        }

        let _lock = self.lock()?;
        if let Some(catalog) = self.read_document()? {
            return Ok(catalog);
        }

        let mut catalog = Catalog::default();
        self.persist(&mut catalog, 1)?;
        tracing::info!(path = %self.path.display(), "Created empty catalog");
        Ok(catalog)
    }

    fn save(&self, catalog: &mut Catalog) -> Result<(), DatabaseError> {
        let _lock = self.lock()?;
        let stored = self.stored_revision()?;
        self.persist(catalog, stored.max(catalog.revision) + 1)
    }

    fn compare_and_swap(&self, catalog: &mut Catalog) -> Result<Swap, DatabaseError> {
        let _lock = self.lock()?;
        let stored = self.stored_revision()?;
        if stored != catalog.revision {
            return Ok(Swap::Conflict);
        }
        self.persist(catalog, stored + 1)?;
        Ok(Swap::Committed)
    }

    fn lookup_id(&self, id: &str) -> Result<Option<ObjectRecord>, DatabaseError> {
        Ok(self
            .read_document()?
            .and_then(|mut catalog| catalog.objects.remove(id)))
    }

    fn lookup_hash(&self, hash: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .read_document()?
            .and_then(|mut catalog| catalog.hash_index.remove(hash)))
    }

    fn stats(&self) -> Result<CatalogStats, DatabaseError> {
        Ok(self
            .read_document()?
            .map(|catalog| catalog.stats)
            .unwrap_or_default())
    }
}
