//! Request spans.
//!
//! Every request gets an `http_request` span carrying the request ID, so log
//! lines from filters and the dispatcher correlate with the access log.

use axum::http::Request;
use tracing::Span;

use crate::http::request::X_REQUEST_ID;

pub fn make_request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
