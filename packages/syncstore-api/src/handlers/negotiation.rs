//! Content negotiation for request and response bodies.
//!
//! Both checks run before any store access, so a rejected request never
//! has side effects.

use hyper::header::{HeaderMap, ACCEPT, CONTENT_TYPE};

use crate::router::RouterError;

/// Media type for one-JSON-document-per-line bodies.
pub const NEWLINES: &str = "application/newlines";
/// Media type for JSON bodies.
pub const JSON: &str = "application/json";
/// Non-standard header some clients send in place of `Accept`.
pub const ACCEPTS: &str = "accepts";

/// Format of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Newlines,
}

/// Format of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Newlines,
}

/// Picks the response format from `Accepts`, falling back to `Accept`.
///
/// Media ranges are tried in descending `q` order, then in the order
/// given. A missing header means JSON.
pub fn negotiate_response(
    headers: &HeaderMap,
    allow_newlines: bool,
) -> Result<ResponseFormat, RouterError> {
    let Some(value) = headers.get(ACCEPTS).or_else(|| headers.get(ACCEPT)) else {
        return Ok(ResponseFormat::Json);
    };
    let value = value
        .to_str()
        .map_err(|_| RouterError::NotAcceptable("Unreadable Accept header".to_string()))?;

    let mut ranges: Vec<(String, f32)> = value
        .split(',')
        .filter_map(|range| {
            let mut parts = range.split(';');
            let media = parts.next()?.trim().to_ascii_lowercase();
            if media.is_empty() {
                return None;
            }
            let q = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((media, q))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (media, _) in &ranges {
        match media.as_str() {
            JSON | "application/*" | "*/*" => return Ok(ResponseFormat::Json),
            NEWLINES if allow_newlines => return Ok(ResponseFormat::Newlines),
            _ => {}
        }
    }
    Err(RouterError::NotAcceptable(format!(
        "Unsupported response format '{}'",
        value
    )))
}

/// Classifies the request body by `Content-Type`. A missing header means JSON.
pub fn request_body_format(headers: &HeaderMap) -> Result<BodyFormat, RouterError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(BodyFormat::Json);
    };
    let media = value
        .to_str()
        .ok()
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match media.as_str() {
        JSON | "text/plain" => Ok(BodyFormat::Json),
        NEWLINES => Ok(BodyFormat::Newlines),
        _ => Err(RouterError::UnsupportedMediaType(format!(
            "Unsupported content type '{}'",
            media
        ))),
    }
}
