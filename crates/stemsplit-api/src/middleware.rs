//! Request middleware: correlation IDs and access logging.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;
use tracing::{info, Span};
use uuid::Uuid;

/// Header carrying the correlation id, echoed back on every response.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Paths whose access lines would only be probe and scrape noise.
const QUIET_PATHS: [&str; 2] = ["/healthz", "/metrics"];

/// Attaches a correlation id to the request.
///
/// An id supplied by the caller wins; otherwise a fresh UUID is minted. The
/// id rides along in request extensions and comes back as a response header.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = match request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(given) => given.to_string(),
        None => Uuid::new_v4().to_string(),
    };

    request.extensions_mut().insert(id.clone());
    Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Writes one access line per request, with latency.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    if !QUIET_PATHS.contains(&uri.path()) {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %started.elapsed().as_millis(),
            "Request finished"
        );
    }
    response
}
