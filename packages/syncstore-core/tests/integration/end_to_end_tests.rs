//! End-to-end workflows through the public store API.

use serde_json::json;

use syncstore_core::query::{ListItems, ListQuery};
use syncstore_core::{BsoFields, StorageError, StoreConfig, Timestamp};

use super::helpers::{manual_store, page_ids};

/// A client uploads a batch, then syncs incrementally with `newer`.
#[test]
fn test_incremental_sync_with_batch_timestamp() {
    let (store, clock) = manual_store(StoreConfig::in_memory());

    let first = store
        .apply_batch(
            "alice",
            "history",
            (0..10)
                .map(|i| json!({"id": format!("h{i}"), "payload": format!("visit {i}")}))
                .collect(),
        )
        .unwrap();
    assert_eq!(first.success.len(), 10);

    clock.advance_secs(30);
    let second = store
        .apply_batch(
            "alice",
            "history",
            vec![
                json!({"id": "h3", "payload": "revisited"}),
                json!({"id": "h10", "payload": "new"}),
            ],
        )
        .unwrap();

    let changes = store
        .list(
            "alice",
            "history",
            &ListQuery::new().with_newer(first.modified).with_full(true),
        )
        .unwrap();
    match changes.items {
        ListItems::Full(bsos) => {
            let ids: Vec<_> = bsos.iter().map(|b| b.id.as_str()).collect();
            assert_eq!(ids, vec!["h10", "h3"]);
            assert!(bsos.iter().all(|b| b.modified == second.modified));
        }
        other => panic!("expected full objects, got {other:?}"),
    }

    let nothing = store
        .list("alice", "history", &ListQuery::new().with_newer(second.modified))
        .unwrap();
    assert!(nothing.items.is_empty());
    assert_eq!(
        store.list_collections("alice").unwrap()["history"],
        second.modified
    );
}

/// Writes, deletes and the info view stay consistent with each other.
#[test]
fn test_collection_lifecycle() {
    let (store, _) = manual_store(StoreConfig::in_memory());

    store
        .put("alice", "test", "a", BsoFields::new().with_payload("x"))
        .unwrap();
    store
        .put("alice", "test", "b", BsoFields::new().with_payload("y"))
        .unwrap();
    store
        .put("alice", "prefs", "p", BsoFields::new().with_payload("z"))
        .unwrap();

    let counts = store.list_collection_counts("alice").unwrap();
    assert_eq!(counts["test"], 2);
    assert_eq!(counts["prefs"], 1);

    store.delete_collection("alice", "test", None).unwrap();
    let collections = store.list_collections("alice").unwrap();
    assert!(!collections.contains_key("test"));
    assert!(collections.contains_key("prefs"));

    for id in ["a", "b", "anything"] {
        let err = store.get("alice", "test", id).unwrap_err();
        assert!(matches!(err, StorageError::BsoNotFound { .. }));
    }
    assert!(store
        .list("alice", "test", &ListQuery::new())
        .unwrap()
        .items
        .is_empty());

    // Writing again recreates the collection
    store.put("alice", "test", "c", BsoFields::new()).unwrap();
    assert_eq!(store.list_collection_counts("alice").unwrap()["test"], 1);
}

/// TTLs hide objects lazily and the sweep reclaims them without changing reads.
#[test]
fn test_expiry_lifecycle() {
    let (store, clock) = manual_store(StoreConfig::in_memory());

    store
        .put("alice", "tabs", "short", BsoFields::new().with_ttl(60))
        .unwrap();
    store
        .put("alice", "tabs", "long", BsoFields::new().with_ttl(3_600))
        .unwrap();

    clock.advance_secs(59);
    assert_eq!(store.list_collection_counts("alice").unwrap()["tabs"], 2);

    clock.advance_secs(1);
    let page = store.list("alice", "tabs", &ListQuery::new()).unwrap();
    assert_eq!(page_ids(&page), vec!["long"]);
    assert_eq!(store.list_collection_counts("alice").unwrap()["tabs"], 1);

    assert_eq!(store.purge_expired().unwrap(), 1);
    assert_eq!(
        page_ids(&store.list("alice", "tabs", &ListQuery::new()).unwrap()),
        vec!["long"]
    );

    clock.advance_secs(3_600);
    assert!(store.list_collections("alice").unwrap().is_empty());
    assert!(store
        .delete_collection("alice", "tabs", None)
        .unwrap_err()
        .is_not_found());
}

/// Timestamps handed out by the engine stay strictly increasing even when
/// the wall clock steps backwards.
#[test]
fn test_clock_step_back_keeps_order() {
    let (store, clock) = manual_store(StoreConfig::in_memory());

    let before = store.put("alice", "c", "a", BsoFields::new()).unwrap();
    clock.set(Timestamp::from_secs(1_000));
    let after = store.put("alice", "c", "b", BsoFields::new()).unwrap();
    assert!(after > before);

    let page = store
        .list("alice", "c", &ListQuery::new().with_newer(before))
        .unwrap();
    assert_eq!(page_ids(&page), vec!["b"]);
}
