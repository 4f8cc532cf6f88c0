//! Per-owner collections and the timestamp counter that orders them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::bso::{Bso, BsoFields};
use crate::clock::Timestamp;

/// Objects stored under one collection name.
#[derive(Debug, Default, Clone)]
pub struct Collection {
    /// Objects by id, including expired ones not yet swept
    pub(crate) bsos: HashMap<String, Bso>,
    /// Timestamp of the most recent delete applied to this collection
    pub(crate) last_deleted: Option<Timestamp>,
}

impl Collection {
    /// Returns the object with `id` if it is live at `now`.
    pub fn live_bso(&self, id: &str, now: Timestamp) -> Option<&Bso> {
        self.bsos.get(id).filter(|bso| bso.is_live(now))
    }

    /// Iterates over the objects live at `now`.
    pub fn live(&self, now: Timestamp) -> impl Iterator<Item = &Bso> {
        self.bsos.values().filter(move |bso| bso.is_live(now))
    }

    /// Returns true if at least one object is live at `now`.
    pub fn has_live(&self, now: Timestamp) -> bool {
        self.live(now).next().is_some()
    }

    /// Latest write or delete, or `None` when nothing is live.
    pub fn last_modified(&self, now: Timestamp) -> Option<Timestamp> {
        let newest = self.live(now).map(|bso| bso.modified).max()?;
        Some(match self.last_deleted {
            Some(deleted) => newest.max(deleted),
            None => newest,
        })
    }

    /// Creates or partially updates an object. Expired objects are replaced.
    pub(crate) fn upsert(
        &mut self,
        id: String,
        fields: BsoFields,
        modified: Timestamp,
        now: Timestamp,
    ) {
        match self.bsos.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    entry.get_mut().merge(fields, modified);
                } else {
                    let id = entry.key().clone();
                    entry.insert(Bso::new(id, fields, modified));
                }
            }
            Entry::Vacant(entry) => {
                let id = entry.key().clone();
                entry.insert(Bso::new(id, fields, modified));
            }
        }
    }

    /// Drops expired objects, returning how many were removed.
    pub(crate) fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.bsos.len();
        self.bsos.retain(|_, bso| bso.is_live(now));
        before - self.bsos.len()
    }
}

/// Everything one owner has stored.
#[derive(Debug, Default, Clone)]
pub struct OwnerState {
    /// Last timestamp handed out to this owner
    pub(crate) last_issued: Timestamp,
    /// Collections by name, including ones whose objects have all expired
    pub(crate) collections: HashMap<String, Collection>,
}

impl OwnerState {
    /// Issues a timestamp strictly greater than any issued before.
    pub(crate) fn issue_timestamp(&mut self, now: Timestamp) -> Timestamp {
        let ts = now.max(self.last_issued.next());
        self.last_issued = ts;
        ts
    }

    /// Last timestamp handed out to this owner.
    pub fn last_issued(&self) -> Timestamp {
        self.last_issued
    }

    /// Looks up a collection by name, live or not.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Returns true if the named collection holds a live object.
    pub fn collection_exists(&self, name: &str, now: Timestamp) -> bool {
        self.collections
            .get(name)
            .is_some_and(|collection| collection.has_live(now))
    }

    /// Writes one object, creating the collection on first use.
    pub(crate) fn upsert(
        &mut self,
        collection: &str,
        id: String,
        fields: BsoFields,
        modified: Timestamp,
        now: Timestamp,
    ) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .upsert(id, fields, modified, now);
    }

    /// Removes the named collection once nothing in it is live.
    pub(crate) fn drop_if_empty(&mut self, name: &str, now: Timestamp) {
        if !self.collection_exists(name, now) {
            self.collections.remove(name);
        }
    }

    /// Sweeps expired objects and empty collections.
    pub(crate) fn purge_expired(&mut self, now: Timestamp) -> usize {
        let mut removed = 0;
        for collection in self.collections.values_mut() {
            removed += collection.purge_expired(now);
        }
        self.collections
            .retain(|_, collection| !collection.bsos.is_empty());
        removed
    }
}
