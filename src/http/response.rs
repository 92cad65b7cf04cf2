//! Upstream response handling.
//!
//! # Design Decisions
//! - Streaming: upstream bodies are never buffered
//! - Hop-by-hop headers stripped on the way back to the client
//! - Status and remaining headers pass through untouched

use axum::body::Body;
use axum::response::Response;
use hyper::body::Incoming;

use crate::security::headers::strip_hop_by_hop;

/// Convert an upstream response into one for the client.
pub fn from_upstream(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
