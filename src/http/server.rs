//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared state (route table, breakers, verifier, counter store)
//! - Create the Axum router: gateway endpoints, fallback endpoints, proxy
//! - Wire up middleware (CORS, request ID, tracing, timeout, body limit,
//!   filter chain)
//! - Serve until shutdown, swapping the route table on config updates

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::HeaderName;
use axum::routing::get;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::gateway_router;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::dispatcher::proxy_handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::tracing::make_request_span;
use crate::resilience::circuit_breaker::BreakerRegistry;
use crate::resilience::fallback::{fallback_handler, FallbackResponder};
use crate::resilience::timeouts::upstream_connector;
use crate::routing::RouteTable;
use crate::security::auth::{AuthFilter, TokenVerifier};
use crate::security::counter_store::{self, CounterStore};
use crate::security::cors::cors_layer;
use crate::security::rate_limit::{RateLimitFilter, RateLimiter};
use crate::security::{filter_requests, Filter, FilterChain};

/// How often expired in-memory rate windows are purged.
const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub breakers: Arc<BreakerRegistry>,
    pub client: Client<HttpConnector, Body>,
    pub filters: Arc<FilterChain>,
    pub verifier: Arc<TokenVerifier>,
    pub counter_store: Arc<dyn CounterStore>,
    pub fallback: Arc<FallbackResponder>,
    pub config: Arc<GatewayConfig>,
    pub identity_header: HeaderName,
    pub started_at: DateTime<Utc>,
    pub uptime: std::time::Instant,
}

/// HTTP server for the edge gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server using the counter store named by the configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let store = counter_store::from_url(config.rate_limit.redis_url.as_deref())
            .map_err(|e| GatewayError::Internal(format!("counter store: {e}")))?;
        Self::with_counter_store(config, store)
    }

    /// Create a server with an explicit counter store.
    pub fn with_counter_store(config: GatewayConfig, store: Arc<dyn CounterStore>) -> Result<Self, GatewayError> {
        let identity_header = HeaderName::try_from(config.auth.identity_header.as_str())
            .map_err(|e| GatewayError::Internal(format!("identity header: {e}")))?;

        let routes = RouteTable::from_config(&config);
        let breakers = Arc::new(BreakerRegistry::new());
        register_breakers(&breakers, &routes);

        let mut filters: Vec<Arc<dyn Filter>> = Vec::new();
        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::new(store.clone(), &config.rate_limit));
            filters.push(Arc::new(RateLimitFilter::new(limiter)));
        }
        filters.push(Arc::new(AuthFilter::new(&config.auth)));
        let filters = FilterChain::new(filters);

        let client = Client::builder(TokioExecutor::new()).build(upstream_connector(&config.timeouts));

        tracing::info!(
            routes = routes.len(),
            filters = ?filters.names(),
            counter_store = store.kind(),
            "Gateway initialized"
        );

        let state = AppState {
            routes: Arc::new(ArcSwap::from_pointee(routes)),
            breakers,
            client,
            filters: Arc::new(filters),
            verifier: Arc::new(TokenVerifier::new(&config.auth)),
            counter_store: store,
            fallback: Arc::new(FallbackResponder::new(&config.fallback)),
            config: Arc::new(config),
            identity_header,
            started_at: Utc::now(),
            uptime: std::time::Instant::now(),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        Router::new()
            .nest("/gateway", gateway_router())
            .nest("/api/gateway", gateway_router())
            .route("/fallback/{service}", get(fallback_handler).post(fallback_handler))
            .fallback(proxy_handler)
            .layer(middleware::from_fn_with_state(state.clone(), filter_requests))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
            .layer(set_request_id_layer())
            .layer(cors_layer(&config.cors))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` replace the route table as a
    /// whole. The server stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let table = RouteTable::from_config(&new_config);
                register_breakers(&state.breakers, &table);
                tracing::info!(routes = table.len(), "Route table reloaded");
                state.routes.store(Arc::new(table));
            }
        });

        let store = self.state.counter_store.clone();
        let janitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        janitor.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }
}

fn register_breakers(registry: &BreakerRegistry, routes: &RouteTable) {
    for route in routes.routes() {
        if let Some(name) = route.breaker.as_deref() {
            registry.get_or_create(name, &route.breaker_config);
        }
    }
}
