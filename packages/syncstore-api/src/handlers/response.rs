//! Response bodies for HTTP endpoints.

use std::collections::BTreeMap;

use serde::Serialize;
use syncstore_core::{BatchOutcome, Bso, ItemError};

/// Consistent API error response wrapper
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Error code (HTTP status code as string)
    pub code: String,
    /// Error message
    pub message: String,
    /// Optional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Consistent error response wrapper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false for error responses
    pub success: bool,
    /// Error information
    pub error: ApiError,
}

/// Helper to create error response
pub fn error_response(code: u16, message: String, details: Option<String>) -> ErrorResponse {
    ErrorResponse {
        success: false,
        error: ApiError {
            code: code.to_string(),
            message,
            details,
        },
    }
}

/// Wire form of a stored object.
#[derive(Debug, Serialize)]
pub struct BsoBody<'a> {
    pub id: &'a str,
    pub modified: f64,
    pub payload: &'a str,
    pub sortindex: i64,
    pub ttl: u64,
}

impl<'a> From<&'a Bso> for BsoBody<'a> {
    fn from(bso: &'a Bso) -> Self {
        Self {
            id: &bso.id,
            modified: bso.modified.as_secs_f64(),
            payload: &bso.payload,
            sortindex: bso.sortindex,
            ttl: bso.ttl,
        }
    }
}

/// Body of every delete endpoint.
#[derive(Debug, Serialize)]
pub struct ModifiedBody {
    pub modified: f64,
}

/// Body of a batch upload.
#[derive(Debug, Serialize)]
pub struct BatchBody<'a> {
    pub modified: f64,
    pub success: &'a [String],
    pub failed: &'a BTreeMap<String, Vec<ItemError>>,
}

impl<'a> From<&'a BatchOutcome> for BatchBody<'a> {
    fn from(outcome: &'a BatchOutcome) -> Self {
        Self {
            modified: outcome.modified.as_secs_f64(),
            success: &outcome.success,
            failed: &outcome.failed,
        }
    }
}

/// Body of `/version`.
#[derive(Debug, Serialize)]
pub struct VersionBody {
    pub version: &'static str,
}
