//! Upgrade (WebSocket and friends) tunnelling.
//!
//! # Data Flow
//! ```text
//! Client ──── upgrade request ────→ Gateway ──── upgrade request ────→ Upstream
//! Client ←─── 101 + upstream headers ─ Gateway ←── 101 Switching Protocols ─┘
//! Client ←════════ raw bytes ═══════→ Gateway ←════════ raw bytes ═══════→ Upstream
//! ```
//!
//! # Design Decisions
//! - Byte-level copy once both sides upgraded; no frame parsing
//! - Bypasses retries and the circuit breaker
//! - The tunnel runs in its own task, outliving the request timeout
//! - Non-101 upstream answers are returned to the client as-is

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode, Version};
use axum::response::Response;
use hyper_util::rt::TokioIo;

use crate::error::GatewayError;
use crate::http::dispatcher::{peer_addr, upstream_uri};
use crate::http::response::from_upstream;
use crate::http::server::AppState;
use crate::resilience::timeouts::{within, Deadline};
use crate::routing::Route;
use crate::security::headers::set_forwarded;

pub async fn tunnel(state: &AppState, route: &Route, mut request: Request) -> Result<Response, GatewayError> {
    let peer = peer_addr(&request);
    let uri = upstream_uri(route, request.uri())?;
    let client_upgrade = hyper::upgrade::on(&mut request);

    // Connection and Upgrade must reach the upstream here.
    let mut headers = request.headers().clone();
    set_forwarded(&mut headers, peer);
    headers.remove(header::HOST);

    let mut upstream_request = hyper::Request::new(Body::empty());
    *upstream_request.method_mut() = request.method().clone();
    *upstream_request.uri_mut() = uri;
    *upstream_request.version_mut() = Version::HTTP_11;
    *upstream_request.headers_mut() = headers;

    let mut upstream_response = match within(route.timeout, state.client.request(upstream_request)).await {
        Deadline::Completed(Ok(response)) => response,
        Deadline::Completed(Err(e)) => return Err(GatewayError::UpstreamConnect(e.to_string())),
        Deadline::Elapsed => return Err(GatewayError::UpstreamTimeout),
    };

    if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(route = %route.id, status = %upstream_response.status(), "Upstream declined upgrade");
        return Ok(from_upstream(upstream_response));
    }

    let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
    let route_id = route.id.clone();

    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client_upgrade, upstream_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(route = %route_id, error = %e, "Upgrade handshake failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((to_upstream, to_client)) => {
                tracing::debug!(route = %route_id, to_upstream, to_client, "Tunnel closed");
            }
            Err(e) => tracing::debug!(route = %route_id, error = %e, "Tunnel closed with error"),
        }
    });

    let (parts, _) = upstream_response.into_parts();
    Ok(Response::from_parts(parts, Body::empty()))
}
