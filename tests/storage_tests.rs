use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use redb::ReadableTable;
use shortlink_store::storage::{
    Catalog, CatalogStats, CatalogStore, Database, JsonCatalog, ObjectRecord, Swap, CATALOG_META,
    META_KEY, OBJECTS,
};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn test_json() -> (tempfile::TempDir, JsonCatalog) {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonCatalog::open(dir.path().join("data")).unwrap();
    (dir, store)
}

fn sample_record(id: &str, hash: &str) -> ObjectRecord {
    ObjectRecord {
        id: id.to_string(),
        original_name: "photo.png".to_string(),
        extension: ".png".to_string(),
        size: 2048,
        hash: hash.to_string(),
        backend_path: format!("media/{id}.png"),
        backend_ref: format!("https://github.com/o/r/blob/main/media/{id}.png"),
        download_location: format!("https://raw.githubusercontent.com/o/r/main/media/{id}.png"),
        uploaded_at: Utc::now(),
        public_url: format!("https://files.example.com/{id}.png"),
    }
}

// ============================================================================
// Behavior shared by every catalog store
// ============================================================================

fn check_load_creates_empty(store: &dyn CatalogStore) {
    let catalog = store.load().unwrap();
    assert_eq!(catalog.last_sequence, 0);
    assert!(catalog.objects.is_empty());
    assert!(catalog.hash_index.is_empty());
    assert_eq!(catalog.stats.total_uploads, 0);
    assert_eq!(catalog.stats.total_size, 0);
    assert_eq!(catalog.stats.unique_files, 0);

    // Persisted: a second load sees the same document
    let again = store.load().unwrap();
    assert_eq!(again.revision, catalog.revision);
}

fn check_save_round_trip(store: &dyn CatalogStore) {
    let mut catalog = store.load().unwrap();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    catalog.insert_new(sample_record("def456", "hash-b"));
    catalog.record_duplicate();
    store.save(&mut catalog).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, catalog);
    assert_eq!(loaded.last_sequence, 2);
    assert_eq!(loaded.stats.total_uploads, 3);
    assert_eq!(loaded.stats.total_size, 4096);
    assert_eq!(loaded.stats.unique_files, 2);
    assert!(loaded.is_consistent());
}

fn check_lookups(store: &dyn CatalogStore) {
    let mut catalog = store.load().unwrap();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    store.save(&mut catalog).unwrap();

    let record = store.lookup_id("abc123").unwrap().expect("record should exist");
    assert_eq!(record.hash, "hash-a");
    assert_eq!(store.lookup_hash("hash-a").unwrap().as_deref(), Some("abc123"));

    assert!(store.lookup_id("doesnotexist").unwrap().is_none());
    assert!(store.lookup_hash("hash-zzz").unwrap().is_none());
}

fn check_compare_and_swap(store: &dyn CatalogStore) {
    let mut first = store.load().unwrap();
    let mut second = store.load().unwrap();

    first.insert_new(sample_record("aaaaaa", "hash-1"));
    assert_eq!(store.compare_and_swap(&mut first).unwrap(), Swap::Committed);

    // Stale snapshot must not clobber the first writer
    second.insert_new(sample_record("bbbbbb", "hash-2"));
    let before = store.load().unwrap();
    assert_eq!(store.compare_and_swap(&mut second).unwrap(), Swap::Conflict);
    assert_eq!(store.load().unwrap(), before);

    // Reload and retry succeeds
    let mut retried = store.load().unwrap();
    retried.insert_new(sample_record("bbbbbb", "hash-2"));
    assert_eq!(store.compare_and_swap(&mut retried).unwrap(), Swap::Committed);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.objects.len(), 2);
    assert!(loaded.is_consistent());
}

fn check_save_is_last_writer_wins(store: &dyn CatalogStore) {
    let mut first = store.load().unwrap();
    let mut second = store.load().unwrap();

    first.insert_new(sample_record("aaaaaa", "hash-1"));
    store.save(&mut first).unwrap();

    second.insert_new(sample_record("bbbbbb", "hash-2"));
    store.save(&mut second).unwrap();

    let loaded = store.load().unwrap();
    assert!(loaded.objects.contains_key("bbbbbb"));
    assert!(!loaded.objects.contains_key("aaaaaa"));
    assert!(store.lookup_hash("hash-1").unwrap().is_none());
    assert!(loaded.revision > first.revision);
}

fn check_stats_reads_counters(store: &dyn CatalogStore) {
    assert_eq!(store.stats().unwrap(), CatalogStats::default());

    let mut catalog = store.load().unwrap();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    catalog.record_duplicate();
    store.save(&mut catalog).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_uploads, 2);
    assert_eq!(stats.total_size, 2048);
    assert_eq!(stats.unique_files, 1);
}

#[test]
fn test_redb_load_creates_empty() {
    let (_dir, db) = test_db();
    check_load_creates_empty(&db);
}

#[test]
fn test_redb_save_round_trip() {
    let (_dir, db) = test_db();
    check_save_round_trip(&db);
}

#[test]
fn test_redb_lookups() {
    let (_dir, db) = test_db();
    check_lookups(&db);
}

#[test]
fn test_redb_compare_and_swap() {
    let (_dir, db) = test_db();
    check_compare_and_swap(&db);
}

#[test]
fn test_redb_save_is_last_writer_wins() {
    let (_dir, db) = test_db();
    check_save_is_last_writer_wins(&db);
}

#[test]
fn test_redb_stats_reads_counters() {
    let (_dir, db) = test_db();
    check_stats_reads_counters(&db);
}

#[test]
fn test_redb_stats_does_not_create_catalog() {
    let (_dir, db) = test_db();
    db.stats().unwrap();

    let read_txn = db.begin_read().unwrap();
    let table = read_txn.open_table(CATALOG_META).unwrap();
    assert!(table.get(META_KEY).unwrap().is_none());
}

#[test]
fn test_redb_compare_and_swap_leaves_existing_rows_alone() {
    let (_dir, db) = test_db();
    let mut catalog = db.load().unwrap();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    db.save(&mut catalog).unwrap();

    // Rewrite the stored row behind the catalog's back; the revision is unchanged.
    let mut edited = sample_record("abc123", "hash-a");
    edited.original_name = "edited.png".to_string();
    let write_txn = db.begin_write().unwrap();
    {
        let mut table = write_txn.open_table(OBJECTS).unwrap();
        let data = rmp_serde::to_vec_named(&edited).unwrap();
        table.insert("abc123", data.as_slice()).unwrap();
    }
    write_txn.commit().unwrap();

    catalog.insert_new(sample_record("def456", "hash-b"));
    assert_eq!(db.compare_and_swap(&mut catalog).unwrap(), Swap::Committed);

    assert_eq!(db.lookup_id("abc123").unwrap().unwrap().original_name, "edited.png");
    assert_eq!(db.lookup_hash("hash-b").unwrap().as_deref(), Some("def456"));
    assert_eq!(db.stats().unwrap().unique_files, 2);
}

#[test]
fn test_redb_compare_and_swap_applies_removals() {
    let (_dir, db) = test_db();
    let mut catalog = db.load().unwrap();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    catalog.insert_new(sample_record("def456", "hash-b"));
    db.save(&mut catalog).unwrap();

    catalog.objects.remove("def456");
    catalog.hash_index.remove("hash-b");
    assert_eq!(db.compare_and_swap(&mut catalog).unwrap(), Swap::Committed);

    assert!(db.lookup_id("def456").unwrap().is_none());
    assert!(db.lookup_hash("hash-b").unwrap().is_none());
    assert_eq!(db.load().unwrap().objects.len(), 1);
}

#[test]
fn test_redb_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();
        let mut catalog = db.load().unwrap();
        catalog.insert_new(sample_record("abc123", "hash-a"));
        db.save(&mut catalog).unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let catalog = db.load().unwrap();
    assert_eq!(catalog.objects.len(), 1);
    assert_eq!(catalog.objects["abc123"].original_name, "photo.png");
}

#[test]
fn test_json_load_creates_empty() {
    let (_dir, store) = test_json();
    check_load_creates_empty(&store);
    assert!(store.path().exists());
}

#[test]
fn test_json_save_round_trip() {
    let (_dir, store) = test_json();
    check_save_round_trip(&store);
}

#[test]
fn test_json_lookups() {
    let (_dir, store) = test_json();
    check_lookups(&store);
}

#[test]
fn test_json_compare_and_swap() {
    let (_dir, store) = test_json();
    check_compare_and_swap(&store);
}

#[test]
fn test_json_save_is_last_writer_wins() {
    let (_dir, store) = test_json();
    check_save_is_last_writer_wins(&store);
}

#[test]
fn test_json_stats_reads_counters() {
    let (_dir, store) = test_json();
    check_stats_reads_counters(&store);
}

#[test]
fn test_json_compare_and_swap_across_instances() {
    const ROUNDS: usize = 100;

    let dir = tempfile::tempdir().unwrap();
    let stores = [
        Arc::new(JsonCatalog::open(dir.path()).unwrap()),
        Arc::new(JsonCatalog::open(dir.path()).unwrap()),
    ];
    stores[0].load().unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = stores
        .iter()
        .enumerate()
        .map(|(writer, store)| {
            let store = Arc::clone(store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut committed = Vec::new();
                for round in 0..ROUNDS {
                    let mut catalog = store.load().unwrap();
                    let id = format!("w{writer}r{round:03}");
                    catalog.insert_new(sample_record(&id, &format!("hash-{id}")));

                    // Both writers hold a snapshot of the same revision here
                    barrier.wait();
                    if store.compare_and_swap(&mut catalog).unwrap() == Swap::Committed {
                        committed.push(id);
                    }
                    barrier.wait();
                }
                committed
            })
        })
        .collect();

    let committed: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    // One winner per round, and every winner is still in the catalog
    assert_eq!(committed.len(), ROUNDS);
    let catalog = stores[1].load().unwrap();
    assert_eq!(catalog.objects.len(), ROUNDS);
    for id in &committed {
        assert!(catalog.objects.contains_key(id), "lost record {id}");
    }
    assert!(catalog.is_consistent());
}

#[test]
fn test_json_rejects_inconsistent_index() {
    let (_dir, store) = test_json();
    let mut catalog = Catalog::default();
    catalog.insert_new(sample_record("abc123", "hash-a"));
    catalog
        .hash_index
        .insert("hash-b".to_string(), "abc123".to_string());
    std::fs::write(store.path(), serde_json::to_vec(&catalog).unwrap()).unwrap();

    let err = store.load().unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn test_catalog_consistency_check() {
    let mut catalog = Catalog::default();
    assert!(catalog.is_consistent());

    catalog.insert_new(sample_record("abc123", "hash-a"));
    assert!(catalog.is_consistent());
    assert_eq!(catalog.find_by_hash("hash-a").unwrap().id, "abc123");

    catalog
        .hash_index
        .insert("hash-a".to_string(), "zzzzzz".to_string());
    assert!(!catalog.is_consistent());
}
