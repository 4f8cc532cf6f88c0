//! Matchit routing configuration.

use std::fmt::Display;
use std::sync::Arc;

use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response};
use matchit::Router as MatchitRouter;

use crate::handlers;
use crate::handlers::request_utils::{
    read_body_with_timeout, timestamp_header, PathParams, RequestContext, X_WEAVE_TIMESTAMP,
};
use syncstore_core::{Store, StoreConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Storage engine
    pub store: Arc<Store>,
    /// Storage configuration
    pub config: Arc<StoreConfig>,
}

/// Signature shared by every endpoint.
type HandlerFn =
    fn(&RequestContext, &PathParams, &AppState) -> Result<Response<Bytes>, RouterError>;

/// HTTP request router.
pub struct Router {
    inner: MatchitRouter<RouteHandler>,
    state: AppState,
}

impl Router {
    /// Creates a router serving `store`.
    pub fn new(store: Arc<Store>) -> Self {
        let config = Arc::new(store.config().clone());
        let mut router = MatchitRouter::new();

        // Storage endpoints
        router
            .insert("/1.5/{owner}/storage", RouteHandler::Storage)
            .expect("Failed to insert /1.5/{owner}/storage route");
        router
            .insert("/1.5/{owner}/storage/{collection}", RouteHandler::Collection)
            .expect("Failed to insert /1.5/{owner}/storage/{collection} route");
        router
            .insert("/1.5/{owner}/storage/{collection}/{id}", RouteHandler::Object)
            .expect("Failed to insert /1.5/{owner}/storage/{collection}/{id} route");

        // Index endpoints
        router
            .insert("/1.5/{owner}/info/collections", RouteHandler::InfoCollections)
            .expect("Failed to insert /1.5/{owner}/info/collections route");
        router
            .insert("/1.5/{owner}/info/collection_counts", RouteHandler::InfoCounts)
            .expect("Failed to insert /1.5/{owner}/info/collection_counts route");
        router
            .insert("/1.5/{owner}/info/collection_usage", RouteHandler::InfoUsage)
            .expect("Failed to insert /1.5/{owner}/info/collection_usage route");

        router
            .insert("/version", RouteHandler::Version)
            .expect("Failed to insert /version route");

        Self {
            inner: router,
            state: AppState { store, config },
        }
    }

    /// Shared state handed to every handler.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Routes an incoming request to the appropriate handler.
    ///
    /// The body is read only for methods that carry one, and only after the
    /// route and method have matched.
    pub async fn route<B>(&self, req: Request<B>) -> Result<Response<Bytes>, RouterError>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path();

        let (route, params) = {
            let matched = self
                .inner
                .at(path)
                .map_err(|_| RouterError::NotFound(format!("No route found for {}", path)))?;
            (*matched.value, PathParams::from_matchit(&matched.params)?)
        };
        let handler = route.select(&parts.method)?;

        let body = if parts.method == Method::PUT || parts.method == Method::POST {
            read_body_with_timeout(body, self.state.config.request_timeout_ms).await?
        } else {
            Bytes::new()
        };

        let ctx = RequestContext {
            method: parts.method,
            headers: parts.headers,
            query: parts.uri.query().map(str::to_string),
            body,
        };
        handler(&ctx, &params, &self.state)
    }

    /// Routes a request and renders any error, stamping `X-Weave-Timestamp`
    /// on responses that lack one.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let mut response = match self.route(req).await {
            Ok(response) => response,
            Err(err) => {
                if let RouterError::InternalError(msg) = &err {
                    tracing::error!(%method, %path, error = %msg, "request failed");
                } else {
                    tracing::debug!(%method, %path, error = %err, "request rejected");
                }
                err.into()
            }
        };
        tracing::debug!(%method, %path, status = response.status().as_u16(), "request handled");

        if !response.headers().contains_key(X_WEAVE_TIMESTAMP) {
            response
                .headers_mut()
                .insert(X_WEAVE_TIMESTAMP, timestamp_header(self.state.store.now()));
        }
        response
    }
}

/// Route handler function.
#[derive(Debug, Clone, Copy)]
enum RouteHandler {
    Storage,
    Collection,
    Object,
    InfoCollections,
    InfoCounts,
    InfoUsage,
    Version,
}

impl RouteHandler {
    /// Picks the endpoint for `method` on this route.
    fn select(self, method: &Method) -> Result<HandlerFn, RouterError> {
        let handler: HandlerFn = match (self, method) {
            (RouteHandler::Storage, &Method::DELETE) => handlers::delete_storage,
            (RouteHandler::Collection, &Method::GET) => handlers::list_objects,
            (RouteHandler::Collection, &Method::POST) => handlers::post_objects,
            (RouteHandler::Collection, &Method::DELETE) => handlers::delete_collection,
            (RouteHandler::Object, &Method::GET) => handlers::get_object,
            (RouteHandler::Object, &Method::PUT) => handlers::put_object,
            (RouteHandler::Object, &Method::DELETE) => handlers::delete_object,
            (RouteHandler::InfoCollections, &Method::GET) => handlers::info_collections,
            (RouteHandler::InfoCounts, &Method::GET) => handlers::info_collection_counts,
            (RouteHandler::InfoUsage, &Method::GET) => handlers::info_collection_usage,
            (RouteHandler::Version, &Method::GET) => handlers::version,
            _ => return Err(RouterError::MethodNotAllowed),
        };
        Ok(handler)
    }
}

/// Router error type.
#[derive(Debug)]
pub enum RouterError {
    MethodNotAllowed,
    InternalError(String),
    Timeout,
    BadRequest(String),
    NotFound(String),
    NotAcceptable(String),
    UnsupportedMediaType(String),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            RouterError::Timeout => write!(f, "Request Timeout"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::NotAcceptable(msg) => write!(f, "Not Acceptable: {}", msg),
            RouterError::UnsupportedMediaType(msg) => {
                write!(f, "Unsupported Media Type: {}", msg)
            }
        }
    }
}

impl std::error::Error for RouterError {}

impl From<RouterError> for Response<Bytes> {
    fn from(err: RouterError) -> Self {
        let (status, message, details) = match &err {
            RouterError::MethodNotAllowed => (405, "Method Not Allowed", None),
            RouterError::InternalError(_) => (500, "Internal Server Error", None),
            RouterError::Timeout => (408, "Request Timeout", None),
            RouterError::BadRequest(msg) => (400, "Bad Request", Some(msg)),
            RouterError::NotFound(msg) => (404, "Not Found", Some(msg)),
            RouterError::NotAcceptable(msg) => (406, "Not Acceptable", Some(msg)),
            RouterError::UnsupportedMediaType(msg) => (415, "Unsupported Media Type", Some(msg)),
        };

        let error_response =
            handlers::error_response(status, message.to_string(), details.cloned());
        let body = serde_json::to_vec(&error_response).unwrap_or_else(|_| {
            format!(
                "{{\"success\":false,\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
                status, message
            )
            .into_bytes()
        });

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() =
            hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}
