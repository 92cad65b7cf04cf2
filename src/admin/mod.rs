//! Gateway self-service endpoints.
//!
//! Mounted under both `/gateway` and `/api/gateway`:
//! - `GET /health`: gateway and counter store status
//! - `GET /info`: application metadata and the route map
//! - `GET /metrics`: uptime, memory, runtime and breaker state

pub mod handlers;

use axum::routing::get;
use axum::Router;

use crate::http::server::AppState;

use self::handlers::{get_health, get_info, get_metrics};

pub fn gateway_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(get_health))
        .route("/info", get(get_info))
        .route("/metrics", get(get_metrics))
}
