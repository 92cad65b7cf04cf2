//! Static degraded-service responses.
//!
//! Served when a breaker is open or retries are exhausted, and directly at
//! `/fallback/{service}`. The body is the same for every cause so upstream
//! error details never reach the client.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FallbackConfig;
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Uniform degraded-service payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackBody {
    pub error: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub suggestion: String,
}

/// Builds fallback bodies from the configured per-service messages.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    messages: BTreeMap<String, String>,
    suggestion: String,
}

impl FallbackResponder {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            messages: config.messages.clone(),
            suggestion: config.suggestion.clone(),
        }
    }

    pub fn message_for(&self, service: &str) -> String {
        self.messages
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("{service} service is temporarily unavailable"))
    }

    pub fn body(&self, service: &str) -> FallbackBody {
        FallbackBody {
            error: true,
            message: self.message_for(service),
            timestamp: Utc::now(),
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            suggestion: self.suggestion.clone(),
        }
    }

    /// Error carrying the fallback body for `service`.
    pub fn unavailable(&self, service: &str) -> GatewayError {
        metrics::record_fallback(service);
        GatewayError::UpstreamUnavailable(Box::new(self.body(service)))
    }
}

/// `GET|POST /fallback/{service}`.
pub async fn fallback_handler(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    state.fallback.unavailable(&service).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_services() {
        let responder = FallbackResponder::new(&FallbackConfig::default());
        assert_eq!(responder.message_for("users"), "User service is temporarily unavailable");
        assert_eq!(responder.message_for("billing"), "billing service is temporarily unavailable");

        let body = responder.body("reports");
        assert!(body.error);
        assert_eq!(body.status, 503);
        assert!(body.suggestion.contains("try again later"));
    }

    #[test]
    fn body_serializes_with_expected_fields() {
        let responder = FallbackResponder::new(&FallbackConfig::default());
        let json = serde_json::to_value(responder.body("auth")).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["status"], 503);
        assert!(json["timestamp"].is_string());
        assert_eq!(json["message"], "Authentication service is temporarily unavailable");
    }
}
