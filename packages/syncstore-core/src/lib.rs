//! Storage engine for per-owner sync storage.
//!
//! Provides timestamped objects grouped into collections, filtered and
//! paginated listing, batch upserts, a cached collection index, lazy expiry
//! with an optional sweep, and snapshot persistence.

pub mod batch;
pub mod bso;
pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod persistence;
pub mod query;
pub mod store;

pub use batch::{BatchItem, BatchOutcome, InvalidItem};
pub use bso::{Bso, BsoFields, FieldLimits, FieldUpdate, ItemError};
pub use clock::{Clock, ManualClock, Rounding, SystemClock, Timestamp};
pub use config::StoreConfig;
pub use error::StorageError;
pub use index::{CollectionIndex, CollectionInfo};
pub use query::{ListItems, ListPage, ListQuery};
pub use store::Store;
