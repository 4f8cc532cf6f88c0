//! Owner-sharded object store.
//!
//! Each owner gets an [`OwnerShard`]: its collections behind one `RwLock`,
//! plus a lock-free cached [`CollectionIndex`]. Every mutation runs inside
//! the owner's write lock, where it issues the owner's next timestamp,
//! applies the change, clears the cached index and marks the shard dirty
//! for persistence. Owners never share a data lock.

mod owner;
mod sweep;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use arc_swap::ArcSwapOption;

use crate::bso::{is_valid_id, Bso, BsoFields, FieldLimits, ItemError};
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::index::CollectionIndex;

pub use owner::{Collection, OwnerState};

/// One owner's state, index cache and dirty flag.
#[derive(Debug)]
pub struct OwnerShard {
    state: RwLock<OwnerState>,
    index_cache: ArcSwapOption<CollectionIndex>,
    dirty: AtomicBool,
}

impl OwnerShard {
    fn new(state: OwnerState) -> Self {
        Self {
            state: RwLock::new(state),
            index_cache: ArcSwapOption::empty(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Acquires the owner's read lock.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, OwnerState>, StorageError> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs `f` inside the owner's exclusive section.
    ///
    /// On success the cached index is cleared and the shard marked dirty
    /// before the lock is released.
    pub(crate) fn mutate<F, R>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut OwnerState) -> Result<R, StorageError>,
    {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let result = f(&mut state)?;
        self.index_cache.store(None);
        self.dirty.store(true, Ordering::Release);
        Ok(result)
    }

    /// Cached index, if one has been built since the last mutation.
    pub(crate) fn cached_index(&self) -> Option<Arc<CollectionIndex>> {
        self.index_cache.load_full()
    }

    /// Publishes an index built under the read lock `_guard`.
    pub(crate) fn cache_index(
        &self,
        _guard: &RwLockReadGuard<'_, OwnerState>,
        index: Arc<CollectionIndex>,
    ) {
        self.index_cache.store(Some(index));
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Marks the shard as needing a flush.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Returns true if the shard changed since its last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// The object store shared by every request.
#[derive(Debug)]
pub struct Store {
    /// Owner name to shard
    owners: RwLock<HashMap<String, Arc<OwnerShard>>>,
    /// Time source for timestamps and expiry
    clock: Arc<dyn Clock>,
    /// Storage configuration
    config: StoreConfig,
}

impl Store {
    /// Creates an empty store driven by the system clock.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty store driven by `clock`.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            owners: RwLock::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Limits applied to incoming fields.
    pub fn field_limits(&self) -> FieldLimits {
        FieldLimits::from(&self.config)
    }

    /// Looks up an owner's shard without creating it.
    pub fn shard(&self, owner: &str) -> Result<Option<Arc<OwnerShard>>, StorageError> {
        let owners = self.owners.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(owners.get(owner).cloned())
    }

    /// Looks up an owner's shard, creating an empty one on first write.
    pub(crate) fn shard_or_create(&self, owner: &str) -> Result<Arc<OwnerShard>, StorageError> {
        if let Some(shard) = self.shard(owner)? {
            return Ok(shard);
        }
        let mut owners = self.owners.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(owners
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(OwnerShard::new(OwnerState::default())))
            .clone())
    }

    /// Installs an owner's state loaded from disk, replacing any existing shard.
    pub(crate) fn restore_owner(&self, owner: String, state: OwnerState) -> Result<(), StorageError> {
        let mut owners = self.owners.write().map_err(|_| StorageError::LockPoisoned)?;
        owners.insert(owner, Arc::new(OwnerShard::new(state)));
        Ok(())
    }

    /// Snapshot of every shard, sorted by owner name.
    pub fn shards(&self) -> Result<Vec<(String, Arc<OwnerShard>)>, StorageError> {
        let owners = self.owners.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut shards: Vec<_> = owners
            .iter()
            .map(|(name, shard)| (name.clone(), shard.clone()))
            .collect();
        shards.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(shards)
    }

    /// Names of every owner known to the store.
    pub fn owners(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.shards()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Creates or partially updates one object.
    ///
    /// # Returns
    /// The new `modified` timestamp, strictly greater than any timestamp
    /// previously issued to `owner`.
    pub fn put(
        &self,
        owner: &str,
        collection: &str,
        id: &str,
        fields: BsoFields,
    ) -> Result<Timestamp, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::InvalidBso {
                id: id.to_string(),
                reasons: vec![ItemError::InvalidId],
            });
        }
        fields
            .validate(&self.field_limits())
            .map_err(|reasons| StorageError::InvalidBso {
                id: id.to_string(),
                reasons,
            })?;

        let shard = self.shard_or_create(owner)?;
        shard.mutate(|state| {
            let now = self.clock.now();
            let modified = state.issue_timestamp(now);
            state.upsert(collection, id.to_string(), fields, modified, now);
            tracing::debug!(owner, collection, id, %modified, "put object");
            Ok(modified)
        })
    }

    /// Fetches one live object.
    pub fn get(&self, owner: &str, collection: &str, id: &str) -> Result<Bso, StorageError> {
        let not_found = || StorageError::BsoNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let shard = self.shard(owner)?.ok_or_else(not_found)?;
        let state = shard.read()?;
        let now = self.clock.now();
        state
            .collection(collection)
            .and_then(|c| c.live_bso(id, now))
            .cloned()
            .ok_or_else(not_found)
    }

    /// Deletes one live object.
    ///
    /// # Returns
    /// The deletion timestamp, which becomes the collection's last-modified.
    pub fn delete(&self, owner: &str, collection: &str, id: &str) -> Result<Timestamp, StorageError> {
        let not_found = || StorageError::BsoNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let shard = self.shard(owner)?.ok_or_else(not_found)?;
        shard.mutate(|state| {
            let now = self.clock.now();
            let exists = state
                .collection(collection)
                .and_then(|c| c.live_bso(id, now))
                .is_some();
            if !exists {
                return Err(not_found());
            }

            let modified = state.issue_timestamp(now);
            if let Some(c) = state.collections.get_mut(collection) {
                c.bsos.remove(id);
                c.last_deleted = Some(modified);
            }
            state.drop_if_empty(collection, now);
            tracing::debug!(owner, collection, id, %modified, "deleted object");
            Ok(modified)
        })
    }

    /// Deletes a whole collection, or only the listed ids.
    ///
    /// Fails with `CollectionNotFound` when the collection holds no live
    /// object, whether or not `ids` is given. Unknown ids are ignored.
    pub fn delete_collection(
        &self,
        owner: &str,
        collection: &str,
        ids: Option<&[String]>,
    ) -> Result<Timestamp, StorageError> {
        let not_found = || StorageError::CollectionNotFound {
            collection: collection.to_string(),
        };
        let shard = self.shard(owner)?.ok_or_else(not_found)?;
        shard.mutate(|state| {
            let now = self.clock.now();
            if !state.collection_exists(collection, now) {
                return Err(not_found());
            }

            let modified = state.issue_timestamp(now);
            match ids {
                None => {
                    state.collections.remove(collection);
                }
                Some(ids) => {
                    if let Some(c) = state.collections.get_mut(collection) {
                        for id in ids {
                            c.bsos.remove(id);
                        }
                        c.last_deleted = Some(modified);
                    }
                    state.drop_if_empty(collection, now);
                }
            }
            tracing::debug!(owner, collection, %modified, "deleted collection objects");
            Ok(modified)
        })
    }

    /// Deletes every collection the owner has. Never fails for unknown owners.
    pub fn delete_all(&self, owner: &str) -> Result<Timestamp, StorageError> {
        let shard = self.shard_or_create(owner)?;
        shard.mutate(|state| {
            let modified = state.issue_timestamp(self.clock.now());
            state.collections.clear();
            tracing::debug!(owner, %modified, "deleted all collections");
            Ok(modified)
        })
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
