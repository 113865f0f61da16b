use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physically stored blob. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub id: String,
    /// Name supplied by the uploader. Untrusted, never used for addressing.
    pub original_name: String,
    pub extension: String,
    pub size: u64,
    pub hash: String,
    pub backend_path: String,
    pub backend_ref: String,
    pub download_location: String,
    pub uploaded_at: DateTime<Utc>,
    pub public_url: String,
}

impl ObjectRecord {
    /// Public file name, `{id}{extension}`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.id, self.extension)
    }
}

/// Aggregate counters kept alongside the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    /// Upload requests served, duplicates included.
    pub total_uploads: u64,
    /// Bytes of unique content stored.
    pub total_size: u64,
    pub unique_files: u64,
}

/// The persisted aggregate: every known object plus the hash index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub last_sequence: u64,
    pub objects: BTreeMap<String, ObjectRecord>,
    pub hash_index: BTreeMap<String, String>,
    pub stats: CatalogStats,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every successful persist; compared by `compare_and_swap`.
    #[serde(default)]
    pub revision: u64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            last_sequence: 0,
            objects: BTreeMap::new(),
            hash_index: BTreeMap::new(),
            stats: CatalogStats::default(),
            updated_at: Utc::now(),
            revision: 0,
        }
    }
}

impl Catalog {
    /// Look up the record for a content hash.
    pub fn find_by_hash(&self, hash: &str) -> Option<&ObjectRecord> {
        self.hash_index.get(hash).and_then(|id| self.objects.get(id))
    }

    /// Insert a freshly stored object and bump every counter.
    ///
    /// Callers must have checked that neither the id nor the hash is present.
    pub fn insert_new(&mut self, record: ObjectRecord) {
        debug_assert!(!self.objects.contains_key(&record.id));
        debug_assert!(!self.hash_index.contains_key(&record.hash));

        self.last_sequence += 1;
        self.stats.total_uploads += 1;
        self.stats.total_size += record.size;
        self.stats.unique_files += 1;
        self.hash_index.insert(record.hash.clone(), record.id.clone());
        self.objects.insert(record.id.clone(), record);
    }

    /// Count an upload request that resolved to existing content.
    pub fn record_duplicate(&mut self) {
        self.stats.total_uploads += 1;
    }

    /// Check the two-index invariant: the hash index is a bijection onto
    /// `objects` keyed by each record's hash.
    pub fn is_consistent(&self) -> bool {
        self.hash_index.len() == self.objects.len()
            && self.hash_index.iter().all(|(hash, id)| {
                self.objects
                    .get(id)
                    .is_some_and(|record| &record.hash == hash && &record.id == id)
            })
    }
}

/// Outcome of a conditional catalog write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    Committed,
    /// The stored revision moved on since the catalog was loaded.
    Conflict,
}
