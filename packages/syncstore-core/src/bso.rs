//! Basic Storage Objects and their partial-update fields.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::clock::Timestamp;
use crate::config::StoreConfig;

/// Time to live applied when a write does not supply one (about 66 years).
pub const DEFAULT_TTL: u64 = 2_100_000_000;
/// Sort index applied when a write does not supply one.
pub const DEFAULT_SORTINDEX: i64 = 0;
/// Longest accepted object id.
pub const MAX_ID_LENGTH: usize = 64;
/// Largest accepted absolute sort index (nine digits).
pub const MAX_SORTINDEX: i64 = 999_999_999;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bso {
    /// Caller-supplied id, unique within its collection
    pub id: String,
    /// Opaque payload
    pub payload: String,
    /// Caller-supplied ordering hint
    pub sortindex: i64,
    /// Seconds after `modified` at which the object expires
    pub ttl: u64,
    /// Time of the last write
    pub modified: Timestamp,
}

impl Bso {
    /// Creates an object from defaults overlaid with `fields`.
    pub fn new(id: String, fields: BsoFields, modified: Timestamp) -> Self {
        let mut bso = Self {
            id,
            payload: String::new(),
            sortindex: DEFAULT_SORTINDEX,
            ttl: DEFAULT_TTL,
            modified,
        };
        bso.merge(fields, modified);
        bso
    }

    /// Overlays the supplied fields and stamps `modified`.
    pub fn merge(&mut self, fields: BsoFields, modified: Timestamp) {
        fields.payload.apply_to(&mut self.payload);
        fields.sortindex.apply_to(&mut self.sortindex);
        fields.ttl.apply_to(&mut self.ttl);
        self.modified = modified;
    }

    /// First instant at which the object is no longer live.
    pub fn expires_at(&self) -> Timestamp {
        self.modified.saturating_add_secs(self.ttl)
    }

    /// Returns true while `now` is before the expiry instant.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at()
    }
}

/// A field that a write either supplies or leaves untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// Caller omitted the field
    Absent,
    /// Caller supplied this value
    Set(T),
}

impl<T> FieldUpdate<T> {
    /// Returns true if the caller supplied a value.
    pub fn is_set(&self) -> bool {
        matches!(self, FieldUpdate::Set(_))
    }

    /// Returns the supplied value, if any.
    pub fn as_option(&self) -> Option<&T> {
        match self {
            FieldUpdate::Set(value) => Some(value),
            FieldUpdate::Absent => None,
        }
    }

    /// Writes the supplied value into `target`; leaves it alone otherwise.
    pub fn apply_to(self, target: &mut T) {
        if let FieldUpdate::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Absent
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldUpdate::Absent, FieldUpdate::Set)
    }
}

/// The writable fields of an object, each present or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BsoFields {
    pub payload: FieldUpdate<String>,
    pub sortindex: FieldUpdate<i64>,
    pub ttl: FieldUpdate<u64>,
}

impl BsoFields {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = FieldUpdate::Set(payload.into());
        self
    }

    /// Sets the sort index.
    pub fn with_sortindex(mut self, sortindex: i64) -> Self {
        self.sortindex = FieldUpdate::Set(sortindex);
        self
    }

    /// Sets the time to live.
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = FieldUpdate::Set(ttl);
        self
    }

    /// Parses and validates the writable fields of a JSON object.
    ///
    /// Unknown keys, `id` and `modified` are ignored. Every invalid field
    /// contributes one reason.
    pub fn from_json_object(
        object: &Map<String, Value>,
        limits: &FieldLimits,
    ) -> Result<Self, Vec<ItemError>> {
        let mut fields = BsoFields::new();
        let mut reasons = Vec::new();

        if let Some(value) = object.get("payload") {
            match value.as_str() {
                Some(payload) if payload.len() > limits.max_payload_bytes => {
                    reasons.push(ItemError::PayloadTooLarge)
                }
                Some(payload) => fields.payload = FieldUpdate::Set(payload.to_string()),
                None => reasons.push(ItemError::InvalidPayload),
            }
        }

        if let Some(value) = object.get("sortindex") {
            match value.as_i64() {
                Some(sortindex) if is_valid_sortindex(sortindex) => {
                    fields.sortindex = FieldUpdate::Set(sortindex)
                }
                _ => reasons.push(ItemError::InvalidSortindex),
            }
        }

        if let Some(value) = object.get("ttl") {
            match value.as_u64() {
                Some(ttl) => fields.ttl = FieldUpdate::Set(ttl),
                None => reasons.push(ItemError::InvalidTtl),
            }
        }

        if reasons.is_empty() {
            Ok(fields)
        } else {
            Err(reasons)
        }
    }

    /// Re-checks fields built in code against the configured limits.
    pub fn validate(&self, limits: &FieldLimits) -> Result<(), Vec<ItemError>> {
        let mut reasons = Vec::new();
        if let Some(payload) = self.payload.as_option() {
            if payload.len() > limits.max_payload_bytes {
                reasons.push(ItemError::PayloadTooLarge);
            }
        }
        if let Some(sortindex) = self.sortindex.as_option() {
            if !is_valid_sortindex(*sortindex) {
                reasons.push(ItemError::InvalidSortindex);
            }
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }
}

/// Size limits applied while parsing fields.
#[derive(Debug, Clone, Copy)]
pub struct FieldLimits {
    /// Maximum payload length in bytes
    pub max_payload_bytes: usize,
}

impl From<&StoreConfig> for FieldLimits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
        }
    }
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

/// Returns true for 1 to 64 printable ASCII characters.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LENGTH && id.bytes().all(|b| (b' '..=b'~').contains(&b))
}

fn is_valid_sortindex(sortindex: i64) -> bool {
    (-MAX_SORTINDEX..=MAX_SORTINDEX).contains(&sortindex)
}

/// Reason an object was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemError {
    InvalidId,
    InvalidPayload,
    PayloadTooLarge,
    InvalidSortindex,
    InvalidTtl,
    InvalidObject,
    /// Batch was over the record limit; the client should resend the object
    RetryBso,
}

impl ItemError {
    /// Reason code reported to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemError::InvalidId => "invalid id",
            ItemError::InvalidPayload => "invalid payload",
            ItemError::PayloadTooLarge => "payload too large",
            ItemError::InvalidSortindex => "invalid sortindex",
            ItemError::InvalidTtl => "invalid ttl",
            ItemError::InvalidObject => "invalid object",
            ItemError::RetryBso => "retry bso",
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ItemError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
