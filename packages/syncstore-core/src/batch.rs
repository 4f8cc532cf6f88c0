//! Multi-object upsert under one shared timestamp.
//!
//! Items are validated independently before the owner's lock is taken.
//! Valid items are then applied in input order under a single timestamp,
//! and invalid ones are reported with their reasons without affecting the
//! rest of the batch.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::bso::{is_valid_id, BsoFields, FieldLimits, ItemError};
use crate::clock::Timestamp;
use crate::error::StorageError;
use crate::store::Store;

/// A validated batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub fields: BsoFields,
}

/// A batch item that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItem {
    /// The item's id, or `""` when it has no usable string id
    pub id: String,
    pub reasons: Vec<ItemError>,
}

impl BatchItem {
    /// Validates one element of a batch body.
    pub fn from_json(value: &Value, limits: &FieldLimits) -> Result<Self, InvalidItem> {
        let Some(object) = value.as_object() else {
            return Err(InvalidItem {
                id: String::new(),
                reasons: vec![ItemError::InvalidObject],
            });
        };

        let mut reasons = Vec::new();
        let id = match object.get("id").and_then(Value::as_str) {
            Some(id) => {
                if !is_valid_id(id) {
                    reasons.push(ItemError::InvalidId);
                }
                id.to_string()
            }
            None => {
                reasons.push(ItemError::InvalidId);
                String::new()
            }
        };

        match BsoFields::from_json_object(object, limits) {
            Ok(fields) if reasons.is_empty() => Ok(Self { id, fields }),
            Ok(_) => Err(InvalidItem { id, reasons }),
            Err(field_reasons) => {
                reasons.extend(field_reasons);
                Err(InvalidItem { id, reasons })
            }
        }
    }
}

/// Result of [`Store::apply_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Timestamp shared by every applied item
    pub modified: Timestamp,
    /// Ids with at least one applied occurrence, in first-seen order
    pub success: Vec<String>,
    /// Ids with no applied occurrence, with every reason reported for them
    pub failed: BTreeMap<String, Vec<ItemError>>,
}

/// Returns the string id of a raw item, or `""`.
fn raw_id(value: &Value) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl Store {
    /// Upserts `items` into one collection under a single timestamp.
    ///
    /// Items past `max_batch_records` fail with `retry bso`. Duplicate ids
    /// are applied in input order, so the last occurrence wins.
    pub fn apply_batch(
        &self,
        owner: &str,
        collection: &str,
        items: Vec<Value>,
    ) -> Result<BatchOutcome, StorageError> {
        let limits = self.field_limits();
        let max_records = self.config().max_batch_records;

        let mut valid = Vec::with_capacity(items.len().min(max_records));
        let mut invalid = Vec::new();
        for (position, value) in items.iter().enumerate() {
            if position >= max_records {
                invalid.push(InvalidItem {
                    id: raw_id(value),
                    reasons: vec![ItemError::RetryBso],
                });
                continue;
            }
            match BatchItem::from_json(value, &limits) {
                Ok(item) => valid.push(item),
                Err(item) => invalid.push(item),
            }
        }

        let mut success = Vec::new();
        let mut applied = HashSet::new();
        for item in &valid {
            if applied.insert(item.id.clone()) {
                success.push(item.id.clone());
            }
        }

        let shard = self.shard_or_create(owner)?;
        let modified = shard.mutate(|state| {
            let now = self.now();
            let modified = state.issue_timestamp(now);
            for item in valid {
                state.upsert(collection, item.id, item.fields, modified, now);
            }
            Ok(modified)
        })?;

        let mut failed: BTreeMap<String, Vec<ItemError>> = BTreeMap::new();
        for item in invalid {
            if applied.contains(&item.id) {
                continue;
            }
            let reasons = failed.entry(item.id).or_default();
            for reason in item.reasons {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }

        tracing::debug!(
            owner,
            collection,
            %modified,
            success = success.len(),
            failed = failed.len(),
            "applied batch"
        );
        Ok(BatchOutcome {
            modified,
            success,
            failed,
        })
    }
}
