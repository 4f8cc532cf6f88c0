//! On-disk file formats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bso::Bso;
use crate::clock::Timestamp;
use crate::store::{Collection, OwnerState};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Index of every persisted owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Owner name to data file entry
    #[serde(default)]
    pub owners: BTreeMap<String, OwnerEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            owners: BTreeMap::new(),
        }
    }
}

/// Location and checksum of one owner's data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerEntry {
    /// File name under `data/`
    pub file: String,
    /// CRC32 of the file contents
    pub checksum: u32,
}

/// Persisted form of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSnapshot {
    pub owner: String,
    pub last_issued: Timestamp,
    pub collections: BTreeMap<String, CollectionSnapshot>,
}

/// Persisted form of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deleted: Option<Timestamp>,
    pub bsos: Vec<Bso>,
}

impl OwnerSnapshot {
    /// Captures `state`, with objects ordered by id for stable output.
    pub fn capture(owner: &str, state: &OwnerState) -> Self {
        let collections = state
            .collections
            .iter()
            .map(|(name, collection)| {
                let mut bsos: Vec<Bso> = collection.bsos.values().cloned().collect();
                bsos.sort_by(|a, b| a.id.cmp(&b.id));
                (
                    name.clone(),
                    CollectionSnapshot {
                        last_deleted: collection.last_deleted,
                        bsos,
                    },
                )
            })
            .collect();
        Self {
            owner: owner.to_string(),
            last_issued: state.last_issued,
            collections,
        }
    }

    /// Rebuilds the in-memory state.
    pub fn into_state(self) -> OwnerState {
        let collections = self
            .collections
            .into_iter()
            .map(|(name, snapshot)| {
                let collection = Collection {
                    bsos: snapshot
                        .bsos
                        .into_iter()
                        .map(|bso| (bso.id.clone(), bso))
                        .collect(),
                    last_deleted: snapshot.last_deleted,
                };
                (name, collection)
            })
            .collect();
        OwnerState {
            last_issued: self.last_issued,
            collections,
        }
    }
}

/// Data file name for one version of an owner's snapshot.
///
/// Hex keeps arbitrary owner names path-safe. The checksum suffix gives each
/// version its own file, so the one the manifest names is never overwritten.
pub fn owner_file_name(owner: &str, checksum: u32) -> String {
    format!("{}-{:08x}.json", hex::encode(owner.as_bytes()), checksum)
}
