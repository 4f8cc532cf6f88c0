//! Reclaims memory held by expired objects.
//!
//! Expired objects are already invisible to every read, so a sweep never
//! changes what clients observe. It only drops them from the maps.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::sync::atomic::Ordering;

use super::{OwnerShard, Store};
use crate::clock::Timestamp;
use crate::error::StorageError;

impl OwnerShard {
    /// Drops the owner's expired objects and empty collections.
    pub fn purge_expired(&self, now: Timestamp) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let removed = state.purge_expired(now);
        if removed > 0 {
            self.index_cache.store(None);
            self.dirty.store(true, Ordering::Release);
        }
        Ok(removed)
    }
}

impl Store {
    /// Sweeps every owner, returning how many objects were removed.
    pub fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = self.now();
        let shards = self.shards()?;

        #[cfg(feature = "parallel")]
        let removed = shards
            .par_iter()
            .map(|(_, shard)| shard.purge_expired(now))
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        #[cfg(not(feature = "parallel"))]
        let removed = shards
            .iter()
            .map(|(_, shard)| shard.purge_expired(now))
            .sum::<Result<usize, StorageError>>()?;

        if removed > 0 {
            tracing::debug!(removed, owners = shards.len(), "purged expired objects");
        }
        Ok(removed)
    }
}
