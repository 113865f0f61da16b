//! Upload orchestration: fingerprint, dedup, allocate, write, record.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::Config;
use crate::fingerprint::fingerprint;
use crate::ident::{self, AllocError};
use crate::object_store::{object_path, ObjectStore, ObjectStoreError};
use crate::storage::{Catalog, CatalogStats, CatalogStore, DatabaseError, ObjectRecord, Swap};

/// Extension recorded when the original name has none.
pub const DEFAULT_EXTENSION: &str = ".bin";

/// Reload-and-reapply rounds before a contended commit gives up.
pub const MAX_COMMIT_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] DatabaseError),
    #[error("Backend write failed: {0}")]
    Backend(#[from] ObjectStoreError),
    #[error("Identifier allocation failed: {0}")]
    Allocation(#[from] AllocError),
    #[error("Catalog changed concurrently {0} times in a row")]
    CatalogContention(usize),
    #[error("Identifier {0} was claimed by another writer")]
    IdentifierTaken(String),
    #[error("Upload task failed: {0}")]
    Task(String),
}

/// Result of a `store` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub id: String,
    pub public_url: String,
    pub size: u64,
    /// Name supplied with *this* request, even for duplicates.
    pub original_name: String,
    pub is_duplicate: bool,
}

enum Applied {
    Inserted,
    Existing(ObjectRecord),
}

/// Owns the read-modify-write cycle against the catalog.
pub struct Uploader {
    backend: Arc<dyn ObjectStore>,
    backend_timeout: Duration,
    catalog: Arc<dyn CatalogStore>,
    folder: String,
    public_base_url: String,
    write_lock: Mutex<()>,
}

impl Uploader {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        backend: Arc<dyn ObjectStore>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            backend_timeout: config.storage.backend_timeout,
            catalog,
            folder: config.storage.folder.clone(),
            public_base_url: config.public_base_url.clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store `data`, or point at the existing object with identical bytes.
    ///
    /// Runs on its own task: if the caller goes away, the backend write and
    /// catalog commit still finish.
    pub async fn store(
        self: &Arc<Self>,
        data: Bytes,
        original_name: &str,
    ) -> Result<StoreOutcome, UploadError> {
        let this = Arc::clone(self);
        let original_name = original_name.to_string();
        tokio::spawn(async move { this.store_serialized(data, original_name).await }.in_current_span())
            .await
            .map_err(|e| UploadError::Task(e.to_string()))?
    }

    async fn store_serialized(
        &self,
        data: Bytes,
        original_name: String,
    ) -> Result<StoreOutcome, UploadError> {
        let hash = fingerprint(&data);
        let size = data.len() as u64;

        let _guard = self.write_lock.lock().await;
        let catalog = self.catalog.load()?;

        if let Some(existing) = catalog.find_by_hash(&hash).cloned() {
            self.commit(catalog, |c| {
                c.record_duplicate();
                Ok(())
            })?;
            tracing::info!(id = %existing.id, %hash, "Duplicate upload");
            return Ok(duplicate_outcome(&existing, original_name, size));
        }

        let id = ident::allocate(&catalog)?;
        let extension = extension_for(&original_name);
        let path = object_path(&self.folder, &id, &extension);
        let message = format!("Upload: {original_name}");

        let stored =
            match tokio::time::timeout(self.backend_timeout, self.backend.put(&path, data, &message))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ObjectStoreError::Unreachable(format!(
                        "no response within {:?}",
                        self.backend_timeout
                    ))
                    .into())
                }
            };

        let record = ObjectRecord {
            public_url: format!("{}/{}{}", self.public_base_url, id, extension),
            id: id.clone(),
            original_name: original_name.clone(),
            extension,
            size,
            hash: hash.clone(),
            backend_path: stored.stored_path,
            backend_ref: stored.view_ref,
            download_location: stored.download_location,
            uploaded_at: Utc::now(),
        };

        let applied = self.commit(catalog, |c| {
            if let Some(existing) = c.find_by_hash(&record.hash).cloned() {
                c.record_duplicate();
                return Ok(Applied::Existing(existing));
            }
            if c.objects.contains_key(&record.id) {
                return Err(UploadError::IdentifierTaken(record.id.clone()));
            }
            c.insert_new(record.clone());
            Ok(Applied::Inserted)
        })?;

        match applied {
            Applied::Inserted => {
                tracing::info!(%id, %hash, size, path = %record.backend_path, "Stored new object");
                Ok(StoreOutcome {
                    id: record.id,
                    public_url: record.public_url,
                    size,
                    original_name,
                    is_duplicate: false,
                })
            }
            Applied::Existing(existing) => {
                tracing::warn!(
                    orphan = %record.backend_path,
                    existing = %existing.id,
                    "Identical content was recorded concurrently, new blob is orphaned"
                );
                Ok(duplicate_outcome(&existing, original_name, size))
            }
        }
    }

    /// Apply `mutate` and persist with compare-and-swap, reloading and
    /// re-applying when another writer got there first.
    fn commit<T, F>(&self, mut catalog: Catalog, mut mutate: F) -> Result<T, UploadError>
    where
        F: FnMut(&mut Catalog) -> Result<T, UploadError>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let result = mutate(&mut catalog)?;
            match self.catalog.compare_and_swap(&mut catalog)? {
                Swap::Committed => return Ok(result),
                Swap::Conflict => {
                    tracing::warn!(attempt, "Catalog changed underneath us, reloading");
                    catalog = self.catalog.load()?;
                }
            }
        }
        Err(UploadError::CatalogContention(MAX_COMMIT_ATTEMPTS))
    }

    /// Metadata for an identifier. Unknown ids are `None`.
    pub fn resolve(&self, id: &str) -> Result<Option<ObjectRecord>, UploadError> {
        Ok(self.catalog.lookup_id(id)?)
    }

    /// Identifier holding content with this fingerprint, if any.
    pub fn lookup_by_hash(&self, hash: &str) -> Result<Option<String>, UploadError> {
        Ok(self.catalog.lookup_hash(hash)?)
    }

    /// Aggregate counters. Reads only; an absent catalog reports zeros.
    pub fn stats(&self) -> Result<CatalogStats, UploadError> {
        Ok(self.catalog.stats()?)
    }
}

fn duplicate_outcome(existing: &ObjectRecord, original_name: String, size: u64) -> StoreOutcome {
    StoreOutcome {
        id: existing.id.clone(),
        public_url: existing.public_url.clone(),
        size,
        original_name,
        is_duplicate: true,
    }
}

/// Lower-cased extension of the last path segment, with its dot.
///
/// Falls back to [`DEFAULT_EXTENSION`] for names without one, dotfiles, and
/// extensions containing anything but ASCII alphanumerics.
pub fn extension_for(original_name: &str) -> String {
    let base = original_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_name);

    match base.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < base.len() => {
            let ext = &base[idx + 1..];
            if ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                format!(".{}", ext.to_ascii_lowercase())
            } else {
                DEFAULT_EXTENSION.to_string()
            }
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
