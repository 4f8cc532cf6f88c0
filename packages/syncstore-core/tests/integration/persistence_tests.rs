//! Persistence across store restarts.

use std::fs;
use std::sync::Arc;

use ntest::timeout;
use serde_json::json;
use tempfile::tempdir;

use syncstore_core::persistence::{owner_file_name, PersistenceManager};
use syncstore_core::query::ListQuery;
use syncstore_core::{BsoFields, ManualClock, StorageError, Store, StoreConfig, Timestamp};

use super::helpers::page_ids;

fn store_with_clock(config: &StoreConfig, clock: Arc<ManualClock>) -> Store {
    Store::with_clock(config.clone(), clock)
}

#[timeout(2000)]
#[test]
fn test_restart_preserves_listing_and_index() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    let persistence = PersistenceManager::new(&config);

    let store = store_with_clock(&config, clock.clone());
    store
        .apply_batch(
            "alice",
            "bookmarks",
            (0..5).map(|i| json!({"id": i.to_string(), "payload": "x"})).collect(),
        )
        .unwrap();
    store
        .put("alice", "prefs", "p", BsoFields::new().with_sortindex(-4))
        .unwrap();
    store.delete("alice", "bookmarks", "2").unwrap();
    persistence.flush_dirty(&store).unwrap();

    let restored = store_with_clock(&config, clock);
    assert_eq!(persistence.load(&restored).unwrap(), 1);

    let query = ListQuery::new().with_limit(2);
    assert_eq!(
        restored.list("alice", "bookmarks", &query).unwrap(),
        store.list("alice", "bookmarks", &query).unwrap()
    );
    assert_eq!(
        restored.list_collections("alice").unwrap(),
        store.list_collections("alice").unwrap()
    );
    assert_eq!(restored.get("alice", "prefs", "p").unwrap().sortindex, -4);
}

#[timeout(2000)]
#[test]
fn test_deleted_owner_data_is_flushed() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    let persistence = PersistenceManager::new(&config);

    let store = store_with_clock(&config, clock.clone());
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    persistence.flush_dirty(&store).unwrap();
    store.delete_all("alice").unwrap();
    persistence.flush_dirty(&store).unwrap();

    let restored = store_with_clock(&config, clock);
    persistence.load(&restored).unwrap();
    assert!(restored.list_collections("alice").unwrap().is_empty());
    assert!(page_ids(&restored.list("alice", "c", &ListQuery::new()).unwrap()).is_empty());
}

#[timeout(2000)]
#[test]
fn test_truncated_data_file_fails_load() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    let persistence = PersistenceManager::new(&config);

    let store = Store::new(config.clone());
    store
        .put("alice", "c", "a", BsoFields::new().with_payload("data"))
        .unwrap();
    persistence.flush_dirty(&store).unwrap();

    let entry = persistence.read_manifest().unwrap().owners["alice"].clone();
    assert_eq!(entry.file, owner_file_name("alice", entry.checksum));
    let path = temp_dir.path().join("data").join(&entry.file);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = persistence.load(&Store::new(config)).unwrap_err();
    assert!(matches!(err, StorageError::DataCorruption(_)), "got {err:?}");
}

#[timeout(2000)]
#[test]
fn test_flush_all_rewrites_clean_owners() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    let persistence = PersistenceManager::new(&config);

    let store = Store::new(config);
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    store.put("bob", "c", "a", BsoFields::new()).unwrap();
    persistence.flush_dirty(&store).unwrap();

    let report = persistence.flush_all(&store).unwrap();
    assert_eq!(report.flushed, 2);
    assert!(persistence.verify().unwrap().iter().all(|e| e.error.is_none()));
}
