//! Request dispatch to upstreams.
//!
//! # Responsibilities
//! - Resolve the route for an admitted request
//! - Rewrite the URI (strip prefix segments, upstream base path)
//! - Forward through the route's circuit breaker and retry policy
//! - Hand upgrade requests to the tunnel
//!
//! # Design Decisions
//! - Bodies are buffered only when a retry may need to replay them
//! - One breaker outcome per client request, however many attempts
//! - Routes without a breaker surface failures as 502 / 504 or pass the
//!   upstream 5xx through; routes with one answer with the fallback

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Uri, Version};
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::http::response::from_upstream;
use crate::http::server::AppState;
use crate::http::upgrade;
use crate::observability::metrics;
use crate::resilience::retries::{is_retryable_status, AttemptFailure, RetryPolicy};
use crate::resilience::timeouts::{within, Deadline};
use crate::routing::Route;
use crate::security::headers::{is_upgrade_request, set_forwarded, strip_hop_by_hop};

/// Catch-all handler: every path not served by the gateway itself.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request_id(&request).unwrap_or("-").to_string();

    let Some(route) = state.routes.load().resolve(&path) else {
        tracing::debug!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request(method.as_str(), 404, "none", start);
        return GatewayError::RouteNotFound(path).into_response();
    };

    tracing::debug!(request_id = %request_id, method = %method, path = %path, route = %route.id, "Proxying request");

    let result = if is_upgrade_request(request.headers()) {
        upgrade::tunnel(&state, &route, request).await
    } else {
        dispatch(&state, &route, request).await
    };

    let response = result.unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(method.as_str(), response.status().as_u16(), &route.id, start);
    response
}

/// Headers for the upstream request.
pub(crate) fn upstream_headers(mut headers: HeaderMap, peer: Option<SocketAddr>) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    set_forwarded(&mut headers, peer);
    // The client sets Host from the upstream URI.
    headers.remove(header::HOST);
    headers
}

pub(crate) fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

pub(crate) fn upstream_uri(route: &Route, uri: &Uri) -> Result<Uri, GatewayError> {
    route
        .upstream_uri(uri.path(), uri.query())
        .map_err(|e| GatewayError::Internal(format!("invalid upstream uri for route {}: {e}", route.id)))
}

enum RequestBody {
    Replayable(Bytes),
    Once(Option<Body>),
}

impl RequestBody {
    fn next(&mut self) -> Body {
        match self {
            RequestBody::Replayable(bytes) => Body::from(bytes.clone()),
            RequestBody::Once(body) => body.take().unwrap_or_else(Body::empty),
        }
    }
}

/// Forward one admitted request through breaker, retries and timeout.
pub async fn dispatch(state: &AppState, route: &Route, request: Request) -> Result<Response, GatewayError> {
    let peer = peer_addr(&request);
    let request_id = request_id(&request).unwrap_or("-").to_string();
    let (parts, body) = request.into_parts();

    let uri = upstream_uri(route, &parts.uri)?;
    let headers = upstream_headers(parts.headers, peer);
    let method = parts.method;

    // Breakers are registered when the route table loads; a request never
    // replaces one.
    let breaker = route.breaker.as_deref().map(|name| {
        state
            .breakers
            .get(name)
            .unwrap_or_else(|| state.breakers.get_or_create(name, &route.breaker_config))
    });

    let permit = match &breaker {
        Some(breaker) => match breaker.try_acquire() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::debug!(request_id = %request_id, route = %route.id, breaker = %breaker.name(), "Circuit open, serving fallback");
                return Err(state.fallback.unavailable(route.service_name()));
            }
        },
        None => None,
    };

    let policy = RetryPolicy::new(route.retries, &state.config.retries);
    let mut body = if policy.applies_to(&method) {
        let limit = state.config.limits.max_body_bytes;
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => RequestBody::Replayable(bytes),
            Err(_) => return Err(GatewayError::PayloadTooLarge { limit }),
        }
    } else {
        RequestBody::Once(Some(body))
    };

    let mut failed_attempts = 0u32;
    let outcome = loop {
        let mut upstream_request = hyper::Request::new(body.next());
        *upstream_request.method_mut() = method.clone();
        *upstream_request.uri_mut() = uri.clone();
        *upstream_request.version_mut() = Version::HTTP_11;
        *upstream_request.headers_mut() = headers.clone();

        let failure = match within(route.timeout, state.client.request(upstream_request)).await {
            Deadline::Completed(Ok(response)) if !is_retryable_status(response.status()) => break Ok(response),
            Deadline::Completed(Ok(response)) => AttemptFailure::ServerError(response),
            Deadline::Completed(Err(e)) => AttemptFailure::Connect(e.to_string()),
            Deadline::Elapsed => AttemptFailure::Timeout,
        };

        failed_attempts += 1;
        if !policy.should_retry(&method, failed_attempts) {
            break Err(failure);
        }

        let delay = policy.backoff(failed_attempts);
        tracing::info!(
            request_id = %request_id,
            route = %route.id,
            attempt = failed_attempts,
            failure = failure.kind(),
            delay = ?delay,
            "Retrying upstream request"
        );
        metrics::record_retry(&route.id);
        tokio::time::sleep(delay).await;
    };

    match outcome {
        Ok(response) => {
            if let Some(permit) = permit {
                permit.succeed();
            }
            Ok(from_upstream(response))
        }
        Err(failure) => {
            tracing::warn!(
                request_id = %request_id,
                route = %route.id,
                attempts = failed_attempts,
                failure = failure.kind(),
                "Upstream request failed"
            );
            if let Some(permit) = permit {
                permit.fail();
                return Err(state.fallback.unavailable(route.service_name()));
            }
            match failure {
                AttemptFailure::ServerError(response) => Ok(from_upstream(response)),
                AttemptFailure::Connect(detail) => Err(GatewayError::UpstreamConnect(detail)),
                AttemptFailure::Timeout => Err(GatewayError::UpstreamTimeout),
            }
        }
    }
}

