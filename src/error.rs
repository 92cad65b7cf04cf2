//! Gateway error types.
//!
//! Every rejection the gateway produces on the request path maps to one
//! variant here. Client-facing bodies never carry internal detail; the full
//! error is logged server-side instead.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::resilience::fallback::FallbackBody;
use crate::security::rate_limit::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed")]
    Authentication,

    #[error("rate limit of {limit} exceeded")]
    RateLimitExceeded { limit: u64 },

    #[error("no route matches {0}")]
    RouteNotFound(String),

    #[error("upstream unavailable: {}", .0.message)]
    UpstreamUnavailable(Box<FallbackBody>),

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::RouteNotFound(_) => "route_not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::UpstreamConnect(_) => "upstream_connect",
            Self::Internal(_) => "internal",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamConnect(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            // No distinction between token failures is leaked.
            Self::Authentication => status.into_response(),
            Self::RateLimitExceeded { limit } => {
                let mut response = status.into_response();
                let headers = response.headers_mut();
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
                response
            }
            Self::RouteNotFound(_) => (status, "No matching route found").into_response(),
            Self::UpstreamUnavailable(body) => (status, Json(*body)).into_response(),
            Self::UpstreamTimeout => (status, "Upstream timed out").into_response(),
            Self::PayloadTooLarge { .. } => (status, "Request body too large").into_response(),
            Self::UpstreamConnect(ref detail) => {
                tracing::error!(error = %detail, "Upstream connection failed");
                (status, "Upstream request failed").into_response()
            }
            Self::Internal(ref detail) => {
                tracing::error!(error = %detail, "Internal gateway error");
                (status, "Internal server error").into_response()
            }
        }
    }
}
