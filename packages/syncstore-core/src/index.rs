//! Per-owner collection summary served by the info endpoints.
//!
//! The index is derived from the store and cached per owner. Mutations
//! clear the cache inside the owner's write lock and rebuilds happen under
//! the read lock, so a cached index always reflects every acknowledged
//! write. Expiry is the only change that happens without a write, so each
//! index also records when its first object expires and is rebuilt after
//! that.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Timestamp;
use crate::error::StorageError;
use crate::store::{OwnerState, Store};

/// Summary of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Latest write or delete in the collection
    pub last_modified: Timestamp,
    /// Live objects in the collection
    pub count: usize,
    /// Sum of live payload lengths in bytes
    pub usage: usize,
}

/// Snapshot of an owner's collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionIndex {
    collections: BTreeMap<String, CollectionInfo>,
    /// First instant at which some indexed object expires
    valid_until: Option<Timestamp>,
}

impl CollectionIndex {
    /// Builds the index of `state` as seen at `now`.
    pub fn build(state: &OwnerState, now: Timestamp) -> Self {
        let mut index = Self::default();
        for (name, collection) in &state.collections {
            let Some(last_modified) = collection.last_modified(now) else {
                continue;
            };
            let mut info = CollectionInfo {
                last_modified,
                count: 0,
                usage: 0,
            };
            for bso in collection.live(now) {
                info.count += 1;
                info.usage += bso.payload.len();
                let expires_at = bso.expires_at();
                index.valid_until = Some(match index.valid_until {
                    Some(current) => current.min(expires_at),
                    None => expires_at,
                });
            }
            index.collections.insert(name.clone(), info);
        }
        index
    }

    /// Returns true while no indexed object has expired.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.valid_until.map_or(true, |until| now < until)
    }

    /// Collections by name.
    pub fn collections(&self) -> &BTreeMap<String, CollectionInfo> {
        &self.collections
    }

    /// Summary of one collection.
    pub fn get(&self, name: &str) -> Option<&CollectionInfo> {
        self.collections.get(name)
    }

    fn map<T>(&self, f: impl Fn(&CollectionInfo) -> T) -> BTreeMap<String, T> {
        self.collections
            .iter()
            .map(|(name, info)| (name.clone(), f(info)))
            .collect()
    }
}

impl Store {
    /// Returns the owner's index, rebuilding it if the cache is empty or stale.
    pub fn collection_index(&self, owner: &str) -> Result<Arc<CollectionIndex>, StorageError> {
        let now = self.now();
        let Some(shard) = self.shard(owner)? else {
            return Ok(Arc::new(CollectionIndex::default()));
        };

        if let Some(index) = shard.cached_index() {
            if index.is_valid_at(now) {
                return Ok(index);
            }
        }

        let state = shard.read()?;
        let index = Arc::new(CollectionIndex::build(&state, now));
        shard.cache_index(&state, index.clone());
        tracing::debug!(owner, collections = index.collections.len(), "rebuilt collection index");
        Ok(index)
    }

    /// Last-modified time of every collection the owner has.
    pub fn list_collections(&self, owner: &str) -> Result<BTreeMap<String, Timestamp>, StorageError> {
        Ok(self.collection_index(owner)?.map(|info| info.last_modified))
    }

    /// Live object count of every collection the owner has.
    pub fn list_collection_counts(&self, owner: &str) -> Result<BTreeMap<String, usize>, StorageError> {
        Ok(self.collection_index(owner)?.map(|info| info.count))
    }

    /// Payload bytes held by every collection the owner has.
    pub fn list_collection_usage(&self, owner: &str) -> Result<BTreeMap<String, usize>, StorageError> {
        Ok(self.collection_index(owner)?.map(|info| info.usage))
    }
}
