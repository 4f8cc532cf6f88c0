//! Shared fixtures for integration tests.

use std::sync::Arc;

use syncstore_core::query::{ListItems, ListPage};
use syncstore_core::{ManualClock, Store, StoreConfig, Timestamp};

/// Store on a stopped clock, plus the clock to move it.
pub fn manual_store(config: StoreConfig) -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    (Store::with_clock(config, clock.clone()), clock)
}

/// Ids of a page regardless of its item form.
pub fn page_ids(page: &ListPage) -> Vec<String> {
    match &page.items {
        ListItems::Ids(ids) => ids.clone(),
        ListItems::Full(bsos) => bsos.iter().map(|b| b.id.clone()).collect(),
    }
}
