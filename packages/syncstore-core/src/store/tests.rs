use super::*;
use crate::clock::ManualClock;
use crate::query::{ListItems, ListQuery};
use ntest::timeout;
use serde_json::json;

fn test_store() -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    let store = Store::with_clock(StoreConfig::in_memory(), clock.clone());
    (store, clock)
}

fn ids(page: &crate::query::ListPage) -> Vec<String> {
    match &page.items {
        ListItems::Ids(ids) => ids.clone(),
        ListItems::Full(bsos) => bsos.iter().map(|b| b.id.clone()).collect(),
    }
}

#[test]
fn test_put_then_get() {
    let (store, _) = test_store();
    let modified = store
        .put("alice", "bookmarks", "a", BsoFields::new().with_payload("hello"))
        .unwrap();

    let bso = store.get("alice", "bookmarks", "a").unwrap();
    assert_eq!(bso.id, "a");
    assert_eq!(bso.payload, "hello");
    assert_eq!(bso.sortindex, crate::bso::DEFAULT_SORTINDEX);
    assert_eq!(bso.ttl, crate::bso::DEFAULT_TTL);
    assert_eq!(bso.modified, modified);
}

#[test]
fn test_timestamps_strictly_increase_on_a_stopped_clock() {
    let (store, _) = test_store();
    let mut previous = Timestamp::ZERO;
    for i in 0..20 {
        let collection = if i % 2 == 0 { "a" } else { "b" };
        let modified = store
            .put("alice", collection, &i.to_string(), BsoFields::new())
            .unwrap();
        assert!(modified > previous);
        previous = modified;
    }
}

#[test]
fn test_partial_update_keeps_omitted_fields() {
    let (store, _) = test_store();
    store
        .put(
            "alice",
            "c",
            "a",
            BsoFields::new()
                .with_payload("first")
                .with_sortindex(7)
                .with_ttl(3_600),
        )
        .unwrap();
    let modified = store
        .put("alice", "c", "a", BsoFields::new().with_sortindex(9))
        .unwrap();

    let bso = store.get("alice", "c", "a").unwrap();
    assert_eq!(bso.payload, "first");
    assert_eq!(bso.sortindex, 9);
    assert_eq!(bso.ttl, 3_600);
    assert_eq!(bso.modified, modified);
}

#[test]
fn test_put_rejects_invalid_id() {
    let (store, _) = test_store();
    let err = store
        .put("alice", "c", &"x".repeat(65), BsoFields::new())
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidBso { .. }));
    assert!(store.list_collections("alice").unwrap().is_empty());
}

#[test]
fn test_put_rejects_oversized_payload() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
    let config = StoreConfig {
        max_payload_bytes: 4,
        ..StoreConfig::in_memory()
    };
    let store = Store::with_clock(config, clock);
    let err = store
        .put("alice", "c", "a", BsoFields::new().with_payload("too long"))
        .unwrap_err();
    match err {
        StorageError::InvalidBso { reasons, .. } => {
            assert_eq!(reasons, vec![ItemError::PayloadTooLarge])
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_get_missing_is_not_found() {
    let (store, _) = test_store();
    assert!(store.get("nobody", "c", "a").unwrap_err().is_not_found());
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    assert!(store.get("alice", "c", "b").unwrap_err().is_not_found());
    assert!(store.get("alice", "other", "a").unwrap_err().is_not_found());
}

#[test]
fn test_expired_object_is_invisible_and_replaced_on_write() {
    let (store, clock) = test_store();
    store
        .put(
            "alice",
            "c",
            "a",
            BsoFields::new()
                .with_payload("old")
                .with_sortindex(3)
                .with_ttl(1),
        )
        .unwrap();
    clock.advance_secs(2);

    assert!(store.get("alice", "c", "a").unwrap_err().is_not_found());
    assert!(store.list_collections("alice").unwrap().is_empty());
    assert!(ids(&store.list("alice", "c", &ListQuery::new()).unwrap()).is_empty());

    // A write to an expired id starts from the defaults
    store
        .put("alice", "c", "a", BsoFields::new().with_payload("new"))
        .unwrap();
    let bso = store.get("alice", "c", "a").unwrap();
    assert_eq!(bso.payload, "new");
    assert_eq!(bso.sortindex, crate::bso::DEFAULT_SORTINDEX);
    assert_eq!(bso.ttl, crate::bso::DEFAULT_TTL);
}

#[test]
fn test_delete_object() {
    let (store, _) = test_store();
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    store.put("alice", "c", "b", BsoFields::new()).unwrap();

    let deleted = store.delete("alice", "c", "a").unwrap();
    assert!(store.get("alice", "c", "a").unwrap_err().is_not_found());
    assert_eq!(store.list_collections("alice").unwrap()["c"], deleted);
    assert!(store.delete("alice", "c", "a").unwrap_err().is_not_found());
}

#[test]
fn test_deleting_last_object_drops_collection() {
    let (store, _) = test_store();
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    store.delete("alice", "c", "a").unwrap();

    assert!(store.list_collections("alice").unwrap().is_empty());
    let shard = store.shard("alice").unwrap().unwrap();
    assert!(shard.read().unwrap().collection("c").is_none());
}

#[test]
fn test_delete_collection() {
    let (store, _) = test_store();
    store.put("alice", "test", "a", BsoFields::new()).unwrap();
    store.put("alice", "test", "b", BsoFields::new()).unwrap();
    store.put("alice", "other", "a", BsoFields::new()).unwrap();

    store.delete_collection("alice", "test", None).unwrap();
    let collections = store.list_collections("alice").unwrap();
    assert!(!collections.contains_key("test"));
    assert!(collections.contains_key("other"));
    assert!(store.get("alice", "test", "a").unwrap_err().is_not_found());

    let err = store.delete_collection("alice", "test", None).unwrap_err();
    assert!(matches!(err, StorageError::CollectionNotFound { .. }));
}

#[test]
fn test_delete_collection_subset() {
    let (store, _) = test_store();
    for id in ["a", "b", "c"] {
        store.put("alice", "test", id, BsoFields::new()).unwrap();
    }

    let subset = vec!["a".to_string(), "zzz".to_string()];
    let modified = store
        .delete_collection("alice", "test", Some(&subset))
        .unwrap();
    let page = store.list("alice", "test", &ListQuery::new()).unwrap();
    assert_eq!(ids(&page), vec!["b", "c"]);
    assert_eq!(page.last_modified, Some(modified));

    let err = store
        .delete_collection("alice", "missing", Some(&subset))
        .unwrap_err();
    assert!(matches!(err, StorageError::CollectionNotFound { .. }));
}

#[test]
fn test_delete_all_always_succeeds() {
    let (store, _) = test_store();
    store.delete_all("nobody").unwrap();

    store.put("alice", "a", "1", BsoFields::new()).unwrap();
    store.put("alice", "b", "1", BsoFields::new()).unwrap();
    let before = store.put("bob", "a", "1", BsoFields::new()).unwrap();
    let modified = store.delete_all("alice").unwrap();
    assert!(modified > before);

    assert!(store.list_collections("alice").unwrap().is_empty());
    assert_eq!(store.list_collections("bob").unwrap().len(), 1);
}

#[test]
fn test_owners_are_isolated() {
    let (store, _) = test_store();
    store
        .put("alice", "c", "a", BsoFields::new().with_payload("mine"))
        .unwrap();
    assert!(store.get("bob", "c", "a").unwrap_err().is_not_found());
    assert!(store.list_collections("bob").unwrap().is_empty());
    assert_eq!(store.owners().unwrap(), vec!["alice".to_string()]);
}

#[test]
fn test_list_orders_by_modified_then_id() {
    let (store, _) = test_store();
    store.put("alice", "c", "b", BsoFields::new()).unwrap();
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    store
        .apply_batch("alice", "c", vec![json!({"id": "z"}), json!({"id": "y"})])
        .unwrap();

    let page = store.list("alice", "c", &ListQuery::new()).unwrap();
    assert_eq!(ids(&page), vec!["b", "a", "y", "z"]);
}

#[test]
fn test_list_pagination_scenario() {
    let (store, _) = test_store();
    for i in 0..5 {
        store
            .put("alice", "test", &i.to_string(), BsoFields::new())
            .unwrap();
    }

    let page = store
        .list("alice", "test", &ListQuery::new().with_limit(2))
        .unwrap();
    assert_eq!(ids(&page), vec!["0", "1"]);
    assert_eq!(page.next_offset, Some(2));

    let page = store
        .list("alice", "test", &ListQuery::new().with_limit(2).with_offset(2))
        .unwrap();
    assert_eq!(ids(&page), vec!["2", "3"]);
    assert_eq!(page.next_offset, Some(4));

    let page = store
        .list("alice", "test", &ListQuery::new().with_offset(4))
        .unwrap();
    assert_eq!(ids(&page), vec!["4"]);
    assert_eq!(page.next_offset, None);
}

#[test]
fn test_list_pages_compose_to_full_listing() {
    let (store, _) = test_store();
    for i in 0..23 {
        store
            .put("alice", "c", &format!("{i:03}"), BsoFields::new())
            .unwrap();
    }
    let all = ids(&store.list("alice", "c", &ListQuery::new()).unwrap());

    let mut collected = Vec::new();
    let mut offset = 0;
    loop {
        let page = store
            .list("alice", "c", &ListQuery::new().with_limit(4).with_offset(offset))
            .unwrap();
        collected.extend(ids(&page));
        match page.next_offset {
            Some(next) => offset = next,
            None => break,
        }
    }
    assert_eq!(collected, all);
}

#[test]
fn test_list_newer_and_older_are_strict() {
    let (store, _) = test_store();
    let t0 = store.put("alice", "c", "0", BsoFields::new()).unwrap();
    let t1 = store.put("alice", "c", "1", BsoFields::new()).unwrap();
    let t2 = store.put("alice", "c", "2", BsoFields::new()).unwrap();

    let page = store
        .list("alice", "c", &ListQuery::new().with_newer(t0))
        .unwrap();
    assert_eq!(ids(&page), vec!["1", "2"]);

    let page = store
        .list("alice", "c", &ListQuery::new().with_older(t2))
        .unwrap();
    assert_eq!(ids(&page), vec!["0", "1"]);

    let page = store
        .list("alice", "c", &ListQuery::new().with_newer(t0).with_older(t2))
        .unwrap();
    assert_eq!(ids(&page), vec!["1"]);

    let page = store
        .list("alice", "c", &ListQuery::new().with_newer(t2))
        .unwrap();
    assert!(page.items.is_empty());
    assert!(t1 > t0);
}

#[test]
fn test_list_ids_filter() {
    let (store, _) = test_store();
    for id in ["a", "b", "c"] {
        store.put("alice", "c", id, BsoFields::new()).unwrap();
    }
    let query = ListQuery::new().with_ids(["c", "a", "missing", "a"]);
    let page = store.list("alice", "c", &query).unwrap();
    assert_eq!(ids(&page), vec!["a", "c"]);
}

#[test]
fn test_list_full_returns_objects() {
    let (store, _) = test_store();
    store
        .put("alice", "c", "a", BsoFields::new().with_payload("p"))
        .unwrap();
    let page = store
        .list("alice", "c", &ListQuery::new().with_full(true))
        .unwrap();
    match page.items {
        ListItems::Full(bsos) => {
            assert_eq!(bsos.len(), 1);
            assert_eq!(bsos[0].payload, "p");
        }
        other => panic!("expected full objects, got {other:?}"),
    }
}

#[test]
fn test_list_missing_collection_is_empty() {
    let (store, _) = test_store();
    let page = store.list("alice", "nothing", &ListQuery::new()).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_offset, None);
    assert_eq!(page.last_modified, None);

    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    store.delete_collection("alice", "c", None).unwrap();
    let page = store
        .list("alice", "c", &ListQuery::new().with_limit(10))
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_offset, None);
}

#[test]
fn test_batch_shares_one_timestamp() {
    let (store, _) = test_store();
    let outcome = store
        .apply_batch(
            "alice",
            "c",
            vec![
                json!({"id": "a", "payload": "1"}),
                json!({"id": "b", "payload": "2"}),
            ],
        )
        .unwrap();
    assert_eq!(outcome.success, vec!["a", "b"]);
    assert!(outcome.failed.is_empty());
    assert_eq!(store.get("alice", "c", "a").unwrap().modified, outcome.modified);
    assert_eq!(store.get("alice", "c", "b").unwrap().modified, outcome.modified);

    let second = store
        .apply_batch("alice", "c", vec![json!({"id": "a", "payload": "changed"})])
        .unwrap();
    assert!(second.modified > outcome.modified);
    let a = store.get("alice", "c", "a").unwrap();
    assert_eq!(a.payload, "changed");
    assert_eq!(a.modified, second.modified);
    let b = store.get("alice", "c", "b").unwrap();
    assert_eq!(b.payload, "2");
    assert_eq!(b.modified, outcome.modified);
}

#[test]
fn test_batch_isolates_invalid_items() {
    let (store, _) = test_store();
    let outcome = store
        .apply_batch(
            "alice",
            "c",
            vec![
                json!({"id": "good", "payload": "ok"}),
                json!({"id": "bad", "ttl": "forever"}),
                json!({"payload": "no id"}),
                json!(42),
            ],
        )
        .unwrap();
    assert_eq!(outcome.success, vec!["good"]);
    assert_eq!(outcome.failed["bad"], vec![ItemError::InvalidTtl]);
    assert_eq!(
        outcome.failed[""],
        vec![ItemError::InvalidId, ItemError::InvalidObject]
    );
    assert!(store.get("alice", "c", "bad").unwrap_err().is_not_found());
}

#[test]
fn test_batch_duplicate_ids_last_wins() {
    let (store, _) = test_store();
    let outcome = store
        .apply_batch(
            "alice",
            "c",
            vec![
                json!({"id": "a", "payload": "first", "sortindex": 1}),
                json!({"id": "a", "payload": "second"}),
                json!({"id": "a", "ttl": "bad"}),
            ],
        )
        .unwrap();
    assert_eq!(outcome.success, vec!["a"]);
    assert!(outcome.failed.is_empty());

    let bso = store.get("alice", "c", "a").unwrap();
    assert_eq!(bso.payload, "second");
    assert_eq!(bso.sortindex, 1);
}

#[test]
fn test_batch_over_limit_asks_for_retry() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
    let config = StoreConfig {
        max_batch_records: 2,
        ..StoreConfig::in_memory()
    };
    let store = Store::with_clock(config, clock);
    let items = (0..4).map(|i| json!({"id": i.to_string()})).collect();
    let outcome = store.apply_batch("alice", "c", items).unwrap();

    assert_eq!(outcome.success, vec!["0", "1"]);
    assert_eq!(outcome.failed["2"], vec![ItemError::RetryBso]);
    assert_eq!(outcome.failed["3"], vec![ItemError::RetryBso]);
    assert!(store.get("alice", "c", "3").unwrap_err().is_not_found());
}

#[test]
fn test_index_reflects_writes_immediately() {
    let (store, _) = test_store();
    let t1 = store
        .put("alice", "a", "1", BsoFields::new().with_payload("abc"))
        .unwrap();
    assert_eq!(store.list_collections("alice").unwrap()["a"], t1);

    let t2 = store
        .put("alice", "b", "1", BsoFields::new().with_payload("de"))
        .unwrap();
    let collections = store.list_collections("alice").unwrap();
    assert_eq!(collections["a"], t1);
    assert_eq!(collections["b"], t2);

    store.put("alice", "a", "2", BsoFields::new()).unwrap();
    let counts = store.list_collection_counts("alice").unwrap();
    assert_eq!(counts["a"], 2);
    assert_eq!(counts["b"], 1);

    let usage = store.list_collection_usage("alice").unwrap();
    assert_eq!(usage["a"], 3);
    assert_eq!(usage["b"], 2);
}

#[test]
fn test_cached_index_is_reused_until_a_write() {
    let (store, _) = test_store();
    store.put("alice", "a", "1", BsoFields::new()).unwrap();

    let first = store.collection_index("alice").unwrap();
    let second = store.collection_index("alice").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    store.put("alice", "a", "2", BsoFields::new()).unwrap();
    let third = store.collection_index("alice").unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.get("a").unwrap().count, 2);
}

#[test]
fn test_cached_index_expires_with_its_objects() {
    let (store, clock) = test_store();
    store
        .put("alice", "short", "1", BsoFields::new().with_ttl(10))
        .unwrap();
    store.put("alice", "long", "1", BsoFields::new()).unwrap();
    assert_eq!(store.list_collection_counts("alice").unwrap().len(), 2);

    clock.advance_secs(10);
    let counts = store.list_collection_counts("alice").unwrap();
    assert!(!counts.contains_key("short"));
    assert_eq!(counts["long"], 1);
}

#[test]
fn test_purge_expired_is_invisible() {
    let (store, clock) = test_store();
    store
        .put("alice", "c", "gone", BsoFields::new().with_ttl(5))
        .unwrap();
    store.put("alice", "c", "kept", BsoFields::new()).unwrap();
    store
        .put("bob", "tmp", "x", BsoFields::new().with_ttl(5))
        .unwrap();
    clock.advance_secs(6);

    let listing_before = store.list("alice", "c", &ListQuery::new()).unwrap();
    let collections_before = store.list_collections("alice").unwrap();

    assert_eq!(store.purge_expired().unwrap(), 2);
    assert_eq!(store.purge_expired().unwrap(), 0);

    assert_eq!(store.list("alice", "c", &ListQuery::new()).unwrap(), listing_before);
    assert_eq!(store.list_collections("alice").unwrap(), collections_before);
    assert!(store.list_collections("bob").unwrap().is_empty());
}

#[test]
fn test_mutations_mark_shard_dirty() {
    let (store, _) = test_store();
    store.put("alice", "c", "a", BsoFields::new()).unwrap();
    let shard = store.shard("alice").unwrap().unwrap();
    assert!(shard.take_dirty());
    assert!(!shard.is_dirty());

    // Failed mutations leave the flag alone
    assert!(store.delete("alice", "c", "missing").is_err());
    assert!(!shard.is_dirty());

    store.delete("alice", "c", "a").unwrap();
    assert!(shard.is_dirty());
}

#[timeout(5000)]
#[test]
fn test_concurrent_writers_get_unique_timestamps() {
    let (store, _) = test_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        store
                            .put("alice", &format!("c{}", t % 3), &format!("{t}-{i}"), BsoFields::new())
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<Timestamp> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total);

    let counts = store.list_collection_counts("alice").unwrap();
    assert_eq!(counts.values().sum::<usize>(), total);
}
