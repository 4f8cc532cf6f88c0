//! Object and collection handlers under `/1.5/{owner}/storage`.

use hyper::body::Bytes;
use hyper::Response;
use serde_json::Value;

use crate::router::{AppState, RouterError};
use syncstore_core::{BsoFields, ListItems, Timestamp};

use super::negotiation::{negotiate_response, request_body_format, BodyFormat, ResponseFormat};
use super::request_utils::{
    build_response, json_response, map_storage_error, newlines_response, parse_delete_ids,
    parse_list_query, timestamp_header, PathParams, RequestContext, X_LAST_MODIFIED,
    X_WEAVE_NEXT_OFFSET, X_WEAVE_RECORDS, X_WEAVE_TIMESTAMP,
};
use super::response::{BatchBody, BsoBody, ModifiedBody};

/// Lists a collection.
///
/// # Endpoint
/// `GET /1.5/{owner}/storage/{collection}`
///
/// # Query Parameters
/// - `ids`: comma-separated ids to restrict the result to
/// - `newer` / `older`: strict bounds on `modified`, in decimal seconds
/// - `full`: return whole objects instead of ids
/// - `limit` / `offset`: page size (`0` means unlimited) and start
///
/// # Response
/// - **200 OK**: JSON array, or one JSON value per line for
///   `application/newlines`. A missing collection lists as empty.
///
/// Headers: `X-Weave-Records` always, `X-Weave-Next-Offset` when more
/// results remain, `X-Last-Modified` when the collection exists.
///
/// # Errors
/// - **400 Bad Request**: Malformed query parameter
/// - **406 Not Acceptable**: No acceptable response format
pub fn list_objects(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let format = negotiate_response(&ctx.headers, true)?;
    let collection = params.collection()?;
    let query = parse_list_query(ctx.query.as_deref())?;

    let page = state
        .store
        .list(&params.owner, collection, &query)
        .map_err(map_storage_error)?;

    let mut response = match &page.items {
        ListItems::Ids(ids) => match format {
            ResponseFormat::Json => json_response(ids)?,
            ResponseFormat::Newlines => newlines_response(ids)?,
        },
        ListItems::Full(bsos) => {
            let bodies: Vec<BsoBody<'_>> = bsos.iter().map(BsoBody::from).collect();
            match format {
                ResponseFormat::Json => json_response(&bodies)?,
                ResponseFormat::Newlines => newlines_response(&bodies)?,
            }
        }
    };

    let headers = response.headers_mut();
    headers.insert(X_WEAVE_RECORDS, page.items.len().into());
    if let Some(next_offset) = page.next_offset {
        headers.insert(X_WEAVE_NEXT_OFFSET, next_offset.into());
    }
    if let Some(last_modified) = page.last_modified {
        headers.insert(X_LAST_MODIFIED, timestamp_header(last_modified));
    }
    Ok(response)
}

/// Fetches one object.
///
/// # Endpoint
/// `GET /1.5/{owner}/storage/{collection}/{id}`
///
/// # Errors
/// - **404 Not Found**: Never written, deleted or expired
/// - **406 Not Acceptable**: Client does not accept JSON
pub fn get_object(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    negotiate_response(&ctx.headers, false)?;
    let bso = state
        .store
        .get(&params.owner, params.collection()?, params.id()?)
        .map_err(map_storage_error)?;

    let mut response = json_response(&BsoBody::from(&bso))?;
    response
        .headers_mut()
        .insert(X_LAST_MODIFIED, timestamp_header(bso.modified));
    Ok(response)
}

/// Creates or partially updates one object.
///
/// # Endpoint
/// `PUT /1.5/{owner}/storage/{collection}/{id}`
///
/// # Request Body
/// ```json
/// {"payload": "...", "sortindex": 3, "ttl": 3600}
/// ```
/// Every field is optional; absent fields keep their stored value.
///
/// # Response
/// - **200 OK**: The new `modified` timestamp as a bare number
///
/// # Errors
/// - **400 Bad Request**: Body is not a JSON object, or a field is invalid
///
/// # Example
/// ```bash
/// curl -X PUT http://localhost:5000/1.5/alice/storage/bookmarks/b1 \
///   -d '{"payload": "hello", "sortindex": 1}'
/// ```
pub fn put_object(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let value: Value = serde_json::from_slice(&ctx.body)
        .map_err(|e| RouterError::BadRequest(format!("Failed to parse object: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| RouterError::BadRequest("Object body must be a JSON object".to_string()))?;
    let fields =
        BsoFields::from_json_object(object, &state.store.field_limits()).map_err(|reasons| {
            let reasons: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
            RouterError::BadRequest(format!("Invalid object: {}", reasons.join(", ")))
        })?;

    let modified = state
        .store
        .put(&params.owner, params.collection()?, params.id()?, fields)
        .map_err(map_storage_error)?;

    let mut response = build_response(200, "application/json", modified.to_string().into_bytes())?;
    response
        .headers_mut()
        .insert(X_WEAVE_TIMESTAMP, timestamp_header(modified));
    Ok(response)
}

/// Upserts many objects into one collection under a single timestamp.
///
/// # Endpoint
/// `POST /1.5/{owner}/storage/{collection}`
///
/// # Request Body
/// A JSON array of objects (`application/json` or `text/plain`), or one
/// object per line (`application/newlines`). Each object carries an `id`.
///
/// # Response
/// - **200 OK**
/// ```json
/// {"modified": 1700000000.12, "success": ["a"], "failed": {"b": ["invalid sortindex"]}}
/// ```
///
/// # Errors
/// - **400 Bad Request**: Body is not an array or a line is not JSON
/// - **415 Unsupported Media Type**: Any other content type
pub fn post_objects(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let items = match request_body_format(&ctx.headers)? {
        BodyFormat::Json => parse_json_items(&ctx.body)?,
        BodyFormat::Newlines => parse_newline_items(&ctx.body)?,
    };

    let outcome = state
        .store
        .apply_batch(&params.owner, params.collection()?, items)
        .map_err(map_storage_error)?;
    tracing::debug!(
        owner = %params.owner,
        success = outcome.success.len(),
        failed = outcome.failed.len(),
        "batch applied"
    );

    let mut response = json_response(&BatchBody::from(&outcome))?;
    response
        .headers_mut()
        .insert(X_WEAVE_TIMESTAMP, timestamp_header(outcome.modified));
    Ok(response)
}

fn parse_json_items(body: &[u8]) -> Result<Vec<Value>, RouterError> {
    match serde_json::from_slice(body) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(RouterError::BadRequest(
            "Batch body must be a JSON array".to_string(),
        )),
        Err(e) => Err(RouterError::BadRequest(format!(
            "Failed to parse batch: {}",
            e
        ))),
    }
}

fn parse_newline_items(body: &[u8]) -> Result<Vec<Value>, RouterError> {
    body.split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .map(|(n, line)| {
            serde_json::from_slice(line).map_err(|e| {
                RouterError::BadRequest(format!("Failed to parse line {}: {}", n + 1, e))
            })
        })
        .collect()
}

/// Deletes one object.
///
/// # Endpoint
/// `DELETE /1.5/{owner}/storage/{collection}/{id}`
///
/// # Errors
/// - **404 Not Found**: Object is not live
pub fn delete_object(
    _ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let modified = state
        .store
        .delete(&params.owner, params.collection()?, params.id()?)
        .map_err(map_storage_error)?;
    modified_response(modified, false)
}

/// Deletes a collection, or only the objects named in `ids`.
///
/// # Endpoint
/// `DELETE /1.5/{owner}/storage/{collection}[?ids=a,b]`
///
/// # Errors
/// - **404 Not Found**: Collection holds no live object
pub fn delete_collection(
    ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let ids = parse_delete_ids(ctx.query.as_deref())?;
    let modified = state
        .store
        .delete_collection(&params.owner, params.collection()?, ids.as_deref())
        .map_err(map_storage_error)?;
    modified_response(modified, true)
}

/// Deletes everything the owner stores. Always succeeds.
///
/// # Endpoint
/// `DELETE /1.5/{owner}/storage`
pub fn delete_storage(
    _ctx: &RequestContext,
    params: &PathParams,
    state: &AppState,
) -> Result<Response<Bytes>, RouterError> {
    let modified = state
        .store
        .delete_all(&params.owner)
        .map_err(map_storage_error)?;
    modified_response(modified, false)
}

fn modified_response(
    modified: Timestamp,
    with_last_modified: bool,
) -> Result<Response<Bytes>, RouterError> {
    let mut response = json_response(&ModifiedBody {
        modified: modified.as_secs_f64(),
    })?;
    let headers = response.headers_mut();
    headers.insert(X_WEAVE_TIMESTAMP, timestamp_header(modified));
    if with_last_modified {
        headers.insert(X_LAST_MODIFIED, timestamp_header(modified));
    }
    Ok(response)
}
