//! Owner snapshots on disk: `manifest.json` plus one checksummed data
//! file per owner under `data/`.


pub mod io_utils;
mod manager;
mod snapshot;

pub use manager::{FlushReport, PersistenceManager, VerifyEntry};
pub use snapshot::{
    owner_file_name, CollectionSnapshot, Manifest, OwnerEntry, OwnerSnapshot, MANIFEST_VERSION,
};
