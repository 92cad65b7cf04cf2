//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (every OPTIONS already answered by the outer CorsLayer):
//!     → auth.rs (verify bearer token once, if present)
//!     → ClientIdentity (user:<sub> or ip:<addr>)
//!     → FilterChain, in order:
//!         rate_limit.rs (per-client fixed window, fail open)
//!         auth.rs (reject non-public paths without a valid token)
//!     → headers.rs (identity header, X-Forwarded-*)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Filters are an ordered list; any one may short-circuit with a response
//! - The CorsLayer sits outside this middleware, so OPTIONS never reaches it
//! - Token verification is local and fails closed
//! - The counter store fails open: an outage never blocks traffic

pub mod auth;
pub mod cors;
pub mod counter_store;
pub mod headers;
pub mod rate_limit;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::server::AppState;
use crate::security::auth::Claims;
use crate::security::rate_limit::RateDecision;

/// Outcome of a single filter.
#[derive(Debug)]
pub enum Verdict {
    Allow,
    Reject(Response),
}

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    User(String),
    Ip(String),
}

impl ClientIdentity {
    /// Verified subject if any, else the client address.
    pub fn resolve(
        claims: Option<&Claims>,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded_for: bool,
    ) -> Self {
        if let Some(claims) = claims {
            return ClientIdentity::User(claims.sub.clone());
        }
        match headers::client_ip(headers, peer, trust_forwarded_for) {
            Some(ip) => ClientIdentity::Ip(ip.to_string()),
            None => ClientIdentity::Ip("unknown".to_string()),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::User(sub) => write!(f, "user:{sub}"),
            ClientIdentity::Ip(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Per-request state threaded through the filters.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub claims: Option<Claims>,
    pub identity: ClientIdentity,
    /// Set by the rate limiter when the store answered.
    pub rate: Option<RateDecision>,
}

/// A request filter.
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Verdict>;
}

/// Ordered filters; the first rejection wins.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> Verdict {
        for filter in &self.filters {
            if let Verdict::Reject(response) = filter.apply(ctx).await {
                tracing::debug!(
                    filter = filter.name(),
                    client = %ctx.identity,
                    path = %ctx.path,
                    status = %response.status(),
                    "Request rejected"
                );
                return Verdict::Reject(response);
            }
        }
        Verdict::Allow
    }
}

/// Axum middleware running the filter chain in front of every route.
pub async fn filter_requests(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let claims = match state.verifier.verify_header(req.headers()) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::trace!(error = %e, "No usable bearer token");
            None
        }
    };

    let identity = ClientIdentity::resolve(
        claims.as_ref(),
        req.headers(),
        peer,
        state.config.rate_limit.trust_forwarded_for,
    );

    let mut ctx = RequestContext {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
        claims,
        identity,
        rate: None,
    };

    let mut response = match state.filters.run(&mut ctx).await {
        Verdict::Allow => {
            headers::set_identity(
                req.headers_mut(),
                &state.identity_header,
                ctx.claims.as_ref().map(|c| c.sub.as_str()),
            );
            req.extensions_mut().insert(ctx.identity.clone());
            next.run(req).await
        }
        Verdict::Reject(response) => response,
    };

    if let Some(decision) = ctx.rate {
        decision.apply(response.headers_mut());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;
    use futures_util::FutureExt;

    struct Deny;

    impl Filter for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn apply<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, Verdict> {
            async { Verdict::Reject(StatusCode::FORBIDDEN.into_response()) }.boxed()
        }
    }

    struct Tag;

    impl Filter for Tag {
        fn name(&self) -> &'static str {
            "tag"
        }

        fn apply<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Verdict> {
            async move {
                ctx.path.push_str("#seen");
                Verdict::Allow
            }
            .boxed()
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            method: Method::GET,
            path: "/api/users".into(),
            claims: None,
            identity: ClientIdentity::Ip("10.0.0.1".into()),
            rate: None,
        }
    }

    #[tokio::test]
    async fn first_rejection_short_circuits() {
        let chain = FilterChain::new(vec![Arc::new(Deny), Arc::new(Tag)]);
        let mut ctx = ctx();
        match chain.run(&mut ctx).await {
            Verdict::Reject(r) => assert_eq!(r.status(), StatusCode::FORBIDDEN),
            Verdict::Allow => panic!("expected rejection"),
        }
        assert_eq!(ctx.path, "/api/users");
    }

    #[tokio::test]
    async fn filters_run_in_order() {
        let chain = FilterChain::new(vec![Arc::new(Tag), Arc::new(Tag)]);
        let mut ctx = ctx();
        assert!(matches!(chain.run(&mut ctx).await, Verdict::Allow));
        assert_eq!(ctx.path, "/api/users#seen#seen");
        assert_eq!(chain.names(), vec!["tag", "tag"]);
    }

    #[test]
    fn identity_prefers_subject() {
        let claims = Claims {
            sub: "alice".into(),
            exp: u64::MAX,
            iat: None,
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let id = ClientIdentity::resolve(Some(&claims), &headers, Some(peer), true);
        assert_eq!(id.to_string(), "user:alice");

        let id = ClientIdentity::resolve(None, &headers, Some(peer), true);
        assert_eq!(id.to_string(), "ip:203.0.113.9");

        let id = ClientIdentity::resolve(None, &headers, Some(peer), false);
        assert_eq!(id.to_string(), "ip:127.0.0.1");

        let id = ClientIdentity::resolve(None, &HeaderMap::new(), None, true);
        assert_eq!(id.to_string(), "ip:unknown");
    }
}
