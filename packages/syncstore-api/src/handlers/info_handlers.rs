//! Collection index and version handlers.

use std::collections::BTreeMap;

use hyper::body::Bytes;
use hyper::Response;

use crate::router::{AppState, RouterError};

use super::negotiation::negotiate_response;
use super::request_utils::{json_response, map_storage_error, PathParams, RequestContext};
use super::response::VersionBody;

/// Maps each collection to its last-modified time.
///
/// # Endpoint
/// `GET /1.5/{owner}/info/collections`
///
/// # Response
/// ```json
/// {"bookmarks": 1700000000.12, "prefs": 1700000003.5}
/// ```
pub fn info_collections(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    negotiate_response(&ctx.headers, false)?;
    let collections: BTreeMap<String, f64> = state
        .store
        .list_collections(&params.owner)
        .map_err(map_storage_error)?
        .into_iter()
        .map(|(name, modified)| (name, modified.as_secs_f64()))
        .collect();
    json_response(&collections)
}

/// Maps each collection to its live object count.
///
/// # Endpoint
/// `GET /1.5/{owner}/info/collection_counts`
pub fn info_collection_counts(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    negotiate_response(&ctx.headers, false)?;
    let counts = state
        .store
        .list_collection_counts(&params.owner)
        .map_err(map_storage_error)?;
    json_response(&counts)
}

/// Maps each collection to the payload bytes of its live objects.
///
/// # Endpoint
/// `GET /1.5/{owner}/info/collection_usage`
pub fn info_collection_usage(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    negotiate_response(&ctx.headers, false)?;
    let usage = state
        .store
        .list_collection_usage(&params.owner)
        .map_err(map_storage_error)?;
    json_response(&usage)
}

/// `GET /version`
pub fn version(
    _ctx: &RequestContext,
    _params: &PathParams,
    _state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    json_response(&VersionBody {
        version: env!("CARGO_PKG_VERSION"),
    })
}
