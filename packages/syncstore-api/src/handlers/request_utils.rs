//! Request utilities for HTTP endpoints.

use std::fmt::Display;

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Response};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tokio::time;

use crate::router::RouterError;
use syncstore_core::{ListQuery, Rounding, StorageError, Timestamp};

/// Type alias for matchit parameters with explicit lifetimes
pub type MatchitParams<'a, 'b> = matchit::Params<'a, 'b>;

/// Header carrying the server time on every response.
pub const X_WEAVE_TIMESTAMP: &str = "x-weave-timestamp";
/// Header carrying the number of items in a listing page.
pub const X_WEAVE_RECORDS: &str = "x-weave-records";
/// Header carrying the offset of the next listing page.
pub const X_WEAVE_NEXT_OFFSET: &str = "x-weave-next-offset";
/// Header carrying a collection's last-modified time.
pub const X_LAST_MODIFIED: &str = "x-last-modified";

/// The parts of a request a handler needs, with the body already read.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

/// Decoded path parameters.
#[derive(Debug, Default)]
pub struct PathParams {
    pub owner: String,
    pub collection: Option<String>,
    pub id: Option<String>,
}

impl PathParams {
    /// Percent-decodes the `owner`, `collection` and `id` segments.
    pub fn from_matchit(params: &MatchitParams<'_, '_>) -> Result<Self, RouterError> {
        let decode = |name: &str| params.get(name).map(decode_path_segment).transpose();
        Ok(Self {
            owner: decode("owner")?.unwrap_or_default(),
            collection: decode("collection")?,
            id: decode("id")?,
        })
    }

    /// Collection segment; routes that call this always capture it.
    pub fn collection(&self) -> Result<&str, RouterError> {
        self.collection
            .as_deref()
            .ok_or_else(|| RouterError::BadRequest("Missing collection".to_string()))
    }

    /// Object id segment; routes that call this always capture it.
    pub fn id(&self) -> Result<&str, RouterError> {
        self.id
            .as_deref()
            .ok_or_else(|| RouterError::BadRequest("Missing object id".to_string()))
    }
}

fn decode_path_segment(raw: &str) -> Result<String, RouterError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| RouterError::BadRequest(format!("Invalid path segment '{}'", raw)))
}

/// Helper function to read request body with timeout
pub async fn read_body_with_timeout<B>(body: B, timeout_ms: u64) -> Result<Bytes, RouterError>
where
    B: Body,
    B::Error: Display,
{
    let timeout_duration = time::Duration::from_millis(timeout_ms);
    let collected = time::timeout(timeout_duration, body.collect())
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| RouterError::InternalError(format!("Failed to read request body: {}", e)))?;
    Ok(collected.to_bytes())
}

/// Map StorageError to appropriate RouterError
pub fn map_storage_error(e: StorageError) -> RouterError {
    match e {
        StorageError::CollectionNotFound { .. } | StorageError::BsoNotFound { .. } => {
            RouterError::NotFound(e.to_string())
        }
        StorageError::InvalidBso { .. } => RouterError::BadRequest(e.to_string()),
        _ => RouterError::InternalError(format!("Storage error: {}", e)),
    }
}

/// Splits a query string into decoded key/value pairs.
///
/// `+` decodes to a space. Pairs without `=` get an empty value.
pub fn parse_query_pairs(query: Option<&str>) -> Result<Vec<(String, String)>, RouterError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(String, String), RouterError> {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_query_component(key)?, decode_query_component(value)?))
        })
        .collect()
}

fn decode_query_component(raw: &str) -> Result<String, RouterError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| RouterError::BadRequest(format!("Invalid query component '{}'", raw)))
}

/// Reads `ids` as a comma-separated list. An empty value means no filter.
pub fn parse_ids(value: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn parse_count(key: &str, value: &str) -> Result<usize, RouterError> {
    value
        .trim()
        .parse()
        .map_err(|e| RouterError::BadRequest(format!("Invalid {} value '{}': {}", key, value, e)))
}

fn parse_bound(key: &str, value: &str, rounding: Rounding) -> Result<Timestamp, RouterError> {
    Timestamp::parse_bound(value, rounding)
        .map_err(|e| RouterError::BadRequest(format!("Invalid {} value: {}", key, e)))
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim(), "0" | "false")
}

/// Parse listing parameters from URL query string.
///
/// Unknown keys are ignored; a malformed known key is a 400.
pub fn parse_list_query(query: Option<&str>) -> Result<ListQuery, RouterError> {
    let mut list_query = ListQuery::new();
    for (key, value) in parse_query_pairs(query)? {
        match key.as_str() {
            "ids" => list_query.ids = parse_ids(&value),
            "newer" => list_query.newer = Some(parse_bound("newer", &value, Rounding::Floor)?),
            "older" => list_query.older = Some(parse_bound("older", &value, Rounding::Ceil)?),
            "full" => list_query.full = parse_flag(&value),
            "limit" => list_query.limit = Some(parse_count("limit", &value)?),
            "offset" => list_query.offset = parse_count("offset", &value)?,
            _ => {}
        }
    }
    Ok(list_query)
}

/// Reads the optional `ids` filter of a collection delete.
pub fn parse_delete_ids(query: Option<&str>) -> Result<Option<Vec<String>>, RouterError> {
    Ok(parse_query_pairs(query)?
        .into_iter()
        .rev()
        .find(|(key, _)| key == "ids")
        .and_then(|(_, value)| parse_ids(&value)))
}

/// Formats a timestamp as a header value.
pub fn timestamp_header(ts: Timestamp) -> HeaderValue {
    HeaderValue::from_str(&ts.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0.00"))
}

/// Helper to build HTTP response with proper error handling
pub fn build_response(
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Bytes::from(body))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

/// Serializes `value` into a 200 JSON response.
pub fn json_response<T: Serialize + ?Sized>(value: &T) -> Result<Response<Bytes>, RouterError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| RouterError::InternalError(format!("Failed to serialize response: {}", e)))?;
    build_response(200, "application/json", json)
}

/// Serializes each value on its own line.
pub fn newlines_response<T: Serialize>(values: &[T]) -> Result<Response<Bytes>, RouterError> {
    let mut body = Vec::new();
    for value in values {
        serde_json::to_writer(&mut body, value).map_err(|e| {
            RouterError::InternalError(format!("Failed to serialize response: {}", e))
        })?;
        body.push(b'\n');
    }
    build_response(200, super::negotiation::NEWLINES, body)
}
