//! Concurrent access across and within owners.

use std::sync::{Arc, Barrier};
use std::thread;

use ntest::timeout;
use rand::Rng;
use serde_json::json;

use syncstore_core::query::ListQuery;
use syncstore_core::{BsoFields, Store, StoreConfig, Timestamp};

use super::helpers::page_ids;

/// Readers racing a writer never see the index lag behind a write they
/// observed through `get`.
#[timeout(10000)]
#[test]
fn test_read_your_writes_through_index() {
    let store = Arc::new(Store::new(StoreConfig::in_memory()));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                let collection = format!("c{w}");
                for i in 0..100 {
                    let modified = store
                        .put("alice", &collection, &i.to_string(), BsoFields::new())
                        .unwrap();
                    let collections = store.list_collections("alice").unwrap();
                    assert!(
                        collections[&collection] >= modified,
                        "index behind acknowledged write"
                    );
                    let counts = store.list_collection_counts("alice").unwrap();
                    assert!(counts[&collection] >= i + 1);
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    let counts = store.list_collection_counts("alice").unwrap();
    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|count| *count == 100));
}

/// Batches from concurrent clients of one owner never share a timestamp.
#[timeout(10000)]
#[test]
fn test_concurrent_batches_get_distinct_timestamps() {
    let store = Arc::new(Store::new(StoreConfig::in_memory()));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..20)
                    .map(|i| {
                        let items = vec![
                            json!({"id": format!("{t}-{i}-a")}),
                            json!({"id": format!("{t}-{i}-b")}),
                        ];
                        store.apply_batch("alice", "c", items).unwrap().modified
                    })
                    .collect::<Vec<Timestamp>>()
            })
        })
        .collect();

    let mut stamps: Vec<Timestamp> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = stamps.len();
    stamps.sort();
    stamps.dedup();
    assert_eq!(stamps.len(), total);

    // Each batch's two objects appear next to each other in listing order
    let ids = page_ids(&store.list("alice", "c", &ListQuery::new()).unwrap());
    assert_eq!(ids.len(), total * 2);
    for pair in ids.chunks(2) {
        assert_eq!(pair[0].trim_end_matches("-a"), pair[1].trim_end_matches("-b"));
    }
}

/// Many owners writing at once each see only their own data.
#[timeout(10000)]
#[test]
fn test_owners_do_not_interfere() {
    let store = Arc::new(Store::new(StoreConfig::in_memory()));

    let handles: Vec<_> = (0..8)
        .map(|o| {
            let store = store.clone();
            thread::spawn(move || {
                let owner = format!("owner{o}");
                let mut rng = rand::thread_rng();
                let writes = rng.gen_range(10..50);
                for i in 0..writes {
                    store
                        .put(&owner, "c", &i.to_string(), BsoFields::new())
                        .unwrap();
                }
                (owner, writes)
            })
        })
        .collect();

    for handle in handles {
        let (owner, writes) = handle.join().unwrap();
        let counts = store.list_collection_counts(&owner).unwrap();
        assert_eq!(counts["c"], writes);
    }
    assert_eq!(store.owners().unwrap().len(), 8);
}

/// Sweeping while writers are active never hides live data.
#[timeout(10000)]
#[test]
fn test_sweep_alongside_writers() {
    let store = Arc::new(Store::new(StoreConfig::in_memory()));

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            for i in 0..200 {
                store
                    .put("alice", "c", &i.to_string(), BsoFields::new())
                    .unwrap();
            }
        })
    };
    let sweeper = {
        let store = store.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                store.purge_expired().unwrap();
            }
        })
    };

    writer.join().unwrap();
    sweeper.join().unwrap();
    assert_eq!(store.list_collection_counts("alice").unwrap()["c"], 200);
}
