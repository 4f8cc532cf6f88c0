//! Storage error types.

use thiserror::Error;

use crate::bso::ItemError;

/// Storage operation errors.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Collection has no live objects
    #[error("Collection '{collection}' not found")]
    CollectionNotFound { collection: String },

    /// Object not found (never written, deleted or expired)
    #[error("Object '{id}' not found in collection '{collection}'")]
    BsoNotFound { collection: String, id: String },

    /// Object fields failed validation
    #[error("Invalid object '{id}': {}", join_reasons(.reasons))]
    InvalidBso { id: String, reasons: Vec<ItemError> },

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Data corruption detected
    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    /// Disk full error during persistence
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// I/O error during persistence
    #[error("I/O error: {0}")]
    IoError(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIoError(String),
}

impl StorageError {
    /// Returns true for errors that mean "no such collection or object".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::CollectionNotFound { .. } | StorageError::BsoNotFound { .. }
        )
    }
}

fn join_reasons(reasons: &[ItemError]) -> String {
    reasons
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
