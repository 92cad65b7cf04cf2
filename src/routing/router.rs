//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for a request path
//! - Build the upstream URI for a matched route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins, earlier declaration wins ties
//! - Explicit NoMatch (None) rather than silent default

use std::sync::Arc;
use std::time::Duration;

use axum::http::Uri;
use url::Url;

use crate::config::{CircuitBreakerConfig, GatewayConfig, RouteConfig};
use crate::routing::matcher::{strip_segments, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub matcher: PathPrefixMatcher,
    /// Upstream origin, e.g. `http://user-service:8081`.
    pub origin: String,
    /// Upstream base path without trailing slash (often empty).
    pub base_path: String,
    pub strip_prefix: usize,
    pub retries: u32,
    pub breaker: Option<String>,
    /// Service name taken from the fallback path (`/fallback/users` → `users`).
    pub fallback_service: Option<String>,
    pub timeout: Duration,
    pub breaker_config: CircuitBreakerConfig,
}

impl Route {
    /// Compile a route from its configuration. Returns `None` for unusable upstreams.
    pub fn compile(config: &RouteConfig, defaults: &GatewayConfig) -> Option<Self> {
        let upstream = Url::parse(&config.upstream).ok()?;
        upstream.host_str()?;

        let fallback_service = config
            .fallback
            .as_deref()
            .and_then(|f| f.strip_prefix("/fallback/"))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            id: config.id.clone(),
            matcher: PathPrefixMatcher::new(config.path_prefix.as_str()),
            origin: upstream.origin().ascii_serialization(),
            base_path: upstream.path().trim_end_matches('/').to_string(),
            strip_prefix: config.strip_prefix,
            retries: config.retries,
            breaker: config.breaker.clone(),
            fallback_service,
            timeout: Duration::from_millis(config.timeout_ms.unwrap_or(defaults.timeouts.upstream_ms)),
            breaker_config: defaults
                .circuit_breaker
                .with_overrides(config.circuit_breaker.as_ref()),
        })
    }

    /// Upstream URI for an inbound path and optional query.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
        let remaining = strip_segments(path, self.strip_prefix);
        let mut target = format!("{}{}{}", self.origin, self.base_path, remaining);
        if let Some(q) = query {
            target.push('?');
            target.push_str(q);
        }
        target.parse()
    }

    /// Name reported in fallback bodies and metrics.
    pub fn service_name(&self) -> &str {
        self.fallback_service.as_deref().unwrap_or(&self.id)
    }
}

/// Immutable, ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Compile every configured route, in declaration order.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .filter_map(|rc| match Route::compile(rc, config) {
                Some(route) => Some(Arc::new(route)),
                None => {
                    tracing::warn!(route = %rc.id, upstream = %rc.upstream, "Invalid upstream, route skipped");
                    None
                }
            })
            .collect();
        Self { routes }
    }

    /// Resolve a path to its route: longest prefix, first declared on ties.
    pub fn resolve(&self, path: &str) -> Option<Arc<Route>> {
        let mut best: Option<&Arc<Route>> = None;
        for route in &self.routes {
            if !route.matcher.matches(path) {
                continue;
            }
            let better = match best {
                Some(current) => route.matcher.specificity() > current.matcher.specificity(),
                None => true,
            };
            if better {
                best = Some(route);
            }
        }
        best.cloned()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(routes: Vec<RouteConfig>) -> RouteTable {
        let config = GatewayConfig {
            routes,
            ..Default::default()
        };
        RouteTable::from_config(&config)
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table(vec![
            RouteConfig::new("api", "/api", "http://a:1"),
            RouteConfig::new("users", "/api/users", "http://b:2"),
            RouteConfig::new("root", "/", "http://c:3"),
        ]);

        assert_eq!(table.resolve("/api/users/7").unwrap().id, "users");
        assert_eq!(table.resolve("/api/reports").unwrap().id, "api");
        assert_eq!(table.resolve("/elsewhere").unwrap().id, "root");
    }

    #[test]
    fn ties_go_to_first_declared() {
        let table = table(vec![
            RouteConfig::new("first", "/api", "http://a:1"),
            RouteConfig::new("second", "/api/", "http://b:2"),
        ]);
        assert_eq!(table.resolve("/api/x").unwrap().id, "first");
    }

    #[test]
    fn no_match_is_explicit() {
        let table = table(vec![RouteConfig::new("users", "/api/users", "http://b:2")]);
        assert!(table.resolve("/api/usersX").is_none());
        assert!(table.resolve("/").is_none());
    }

    #[test]
    fn builds_upstream_uri_with_strip_and_query() {
        let mut rc = RouteConfig::new("users", "/api/users", "http://user-service:8081");
        rc.strip_prefix = 1;
        rc.fallback = Some("/fallback/users".into());
        let route = Route::compile(&rc, &GatewayConfig::default()).unwrap();

        let uri = route.upstream_uri("/api/users/register", Some("a=1")).unwrap();
        assert_eq!(uri.to_string(), "http://user-service:8081/users/register?a=1");
        assert_eq!(route.service_name(), "users");
    }

    #[test]
    fn upstream_base_path_is_kept() {
        let mut rc = RouteConfig::new("reports", "/api/reports", "http://reports:8083/v2/");
        rc.strip_prefix = 2;
        let route = Route::compile(&rc, &GatewayConfig::default()).unwrap();
        assert_eq!(route.upstream_uri("/api/reports/9", None).unwrap().to_string(), "http://reports:8083/v2/9");
        assert_eq!(route.service_name(), "reports");
    }
}
