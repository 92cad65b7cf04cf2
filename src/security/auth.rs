//! Bearer token verification.
//!
//! Tokens are HMAC-signed JWTs checked locally against the shared secret.
//! Every failure mode maps to the same 401 with an empty body.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::future::{self, BoxFuture, FutureExt};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::{Filter, RequestContext, Verdict};

/// Claims carried by a gateway token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("Authorization header is not a bearer token")]
    NotBearer,

    #[error("token has an empty subject")]
    EmptySubject,

    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Map a configured algorithm name to an HMAC algorithm.
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        _ => None,
    }
}

/// Stateless token verifier, built once at startup.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut algorithms: Vec<Algorithm> = config
            .algorithms
            .iter()
            .filter_map(|name| parse_algorithm(name))
            .collect();
        if algorithms.is_empty() {
            algorithms.push(Algorithm::HS512);
        }

        let mut validation = Validation::new(algorithms[0]);
        validation.algorithms = algorithms;
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::EmptySubject);
        }
        Ok(data.claims)
    }

    /// Verify the `Authorization: Bearer <token>` header.
    pub fn verify_header(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::NotBearer)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NotBearer)?;
        self.verify(token)
    }
}

/// Mint an HS512 token for `subject`. Used by the CLI and tests.
pub fn issue_token(secret: &str, subject: &str, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: subject.to_string(),
        exp: now + ttl.as_secs(),
        iat: Some(now),
    };
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Rejects requests to non-public paths that carry no valid token.
pub struct AuthFilter {
    public_paths: Vec<String>,
}

impl AuthFilter {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            public_paths: config.public_paths.clone(),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl Filter for AuthFilter {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn apply<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Verdict> {
        let verdict = if ctx.claims.is_some() || self.is_public(&ctx.path) {
            Verdict::Allow
        } else {
            metrics::record_auth_rejected();
            Verdict::Reject(GatewayError::Authentication.into_response())
        };
        future::ready(verdict).boxed()
    }
}
