//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits, windows, thresholds > 0)
//! - Check that upstreams are plain-HTTP URLs the dispatcher can reach
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use url::Url;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig};
use crate::security::auth::parse_algorithm;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(String),

    #[error("route '{id}': path prefix '{prefix}' must start with '/'")]
    InvalidPrefix { id: String, prefix: String },

    #[error("route '{id}': upstream '{upstream}' is not a valid http URL")]
    InvalidUpstream { id: String, upstream: String },

    #[error("route '{id}': fallback '{fallback}' must look like /fallback/<service>")]
    InvalidFallback { id: String, fallback: String },

    #[error("route '{id}': timeout must be greater than zero")]
    ZeroRouteTimeout { id: String },

    #[error("route '{id}': circuit_breaker.{field} must be greater than zero")]
    ZeroRouteBreaker { id: String, field: &'static str },

    #[error("breaker '{name}' configured differently by routes {}", .routes.join(", "))]
    ConflictingBreaker { name: String, routes: Vec<String> },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("auth secret must not be empty")]
    EmptySecret,

    #[error("unsupported signing algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    let mut ids = HashSet::new();
    let mut breakers: BTreeMap<&str, Vec<(&str, CircuitBreakerConfig)>> = BTreeMap::new();
    for route in &config.routes {
        if !ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix {
                id: route.id.clone(),
                prefix: route.path_prefix.clone(),
            });
        }
        let upstream_ok = Url::parse(&route.upstream)
            .map(|u| u.scheme() == "http" && u.host_str().is_some())
            .unwrap_or(false);
        if !upstream_ok {
            errors.push(ValidationError::InvalidUpstream {
                id: route.id.clone(),
                upstream: route.upstream.clone(),
            });
        }
        if let Some(fallback) = &route.fallback {
            let service = fallback.strip_prefix("/fallback/").unwrap_or_default();
            if service.is_empty() || service.contains('/') {
                errors.push(ValidationError::InvalidFallback {
                    id: route.id.clone(),
                    fallback: fallback.clone(),
                });
            }
        }
        if route.timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroRouteTimeout { id: route.id.clone() });
        }

        let merged = config
            .circuit_breaker
            .with_overrides(route.circuit_breaker.as_ref());
        if route.circuit_breaker.is_some() {
            let fields = [
                (merged.failure_threshold == 0, "failure_threshold"),
                (merged.success_threshold == 0, "success_threshold"),
                (merged.half_open_max_calls == 0, "half_open_max_calls"),
            ];
            errors.extend(fields.into_iter().filter(|(is_zero, _)| *is_zero).map(
                |(_, field)| ValidationError::ZeroRouteBreaker {
                    id: route.id.clone(),
                    field,
                },
            ));
        }
        if let Some(name) = &route.breaker {
            breakers
                .entry(name.as_str())
                .or_default()
                .push((route.id.as_str(), merged));
        }
    }

    // Routes sharing a breaker must agree on its settings.
    for (name, users) in breakers {
        let Some((_, first)) = users.first() else {
            continue;
        };
        if users.iter().any(|(_, cfg)| cfg != first) {
            errors.push(ValidationError::ConflictingBreaker {
                name: name.to_string(),
                routes: users.iter().map(|(id, _)| id.to_string()).collect(),
            });
        }
    }

    if config.auth.secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }
    for alg in &config.auth.algorithms {
        if parse_algorithm(alg).is_none() {
            errors.push(ValidationError::UnknownAlgorithm(alg.clone()));
        }
    }
    if config.auth.algorithms.is_empty() {
        errors.push(ValidationError::Zero("auth.algorithms"));
    }

    let numbers = [
        (config.rate_limit.limit == 0, "rate_limit.limit"),
        (config.rate_limit.window_secs == 0, "rate_limit.window_secs"),
        (config.rate_limit.store_timeout_ms == 0, "rate_limit.store_timeout_ms"),
        (config.circuit_breaker.failure_threshold == 0, "circuit_breaker.failure_threshold"),
        (config.circuit_breaker.success_threshold == 0, "circuit_breaker.success_threshold"),
        (config.circuit_breaker.half_open_max_calls == 0, "circuit_breaker.half_open_max_calls"),
        (config.timeouts.upstream_ms == 0, "timeouts.upstream_ms"),
        (config.timeouts.request_secs == 0, "timeouts.request_secs"),
        (config.limits.max_body_bytes == 0, "limits.max_body_bytes"),
    ];
    errors.extend(
        numbers
            .into_iter()
            .filter(|(is_zero, _)| *is_zero)
            .map(|(_, field)| ValidationError::Zero(field)),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerOverrides, RouteConfig};

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_route_problem() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::new("a", "api", "http://127.0.0.1:1"));
        config.routes.push(RouteConfig::new("a", "/b", "ftp://example.com"));
        let mut bad_fallback = RouteConfig::new("c", "/c", "http://c:80");
        bad_fallback.fallback = Some("/elsewhere".into());
        config.routes.push(bad_fallback);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateRouteId("a".into())));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidPrefix { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidUpstream { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidFallback { .. })));
    }

    #[test]
    fn rejects_zero_limits_and_unknown_algorithms() {
        let mut config = GatewayConfig::default();
        config.rate_limit.limit = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.auth.algorithms = vec!["RS256".into()];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero("rate_limit.limit")));
        assert!(errors.contains(&ValidationError::Zero("circuit_breaker.failure_threshold")));
        assert!(errors.contains(&ValidationError::UnknownAlgorithm("RS256".into())));
    }

    #[test]
    fn rejects_zero_per_route_breaker_overrides() {
        let mut config = GatewayConfig::default();
        let mut route = RouteConfig::new("users", "/api/users", "http://127.0.0.1:1");
        route.breaker = Some("users".into());
        route.circuit_breaker = Some(BreakerOverrides {
            half_open_max_calls: Some(0),
            failure_threshold: Some(0),
            ..Default::default()
        });
        config.routes.push(route);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroRouteBreaker {
                    id: "users".into(),
                    field: "failure_threshold"
                },
                ValidationError::ZeroRouteBreaker {
                    id: "users".into(),
                    field: "half_open_max_calls"
                },
            ]
        );
    }

    #[test]
    fn nonzero_per_route_overrides_are_accepted() {
        let mut config = GatewayConfig::default();
        let mut route = RouteConfig::new("reports", "/api/reports", "http://127.0.0.1:1");
        route.breaker = Some("reports".into());
        route.circuit_breaker = Some(BreakerOverrides {
            failure_threshold: Some(1),
            reset_timeout_ms: Some(5_000),
            ..Default::default()
        });
        config.routes.push(route);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_shared_breaker_with_different_settings() {
        let mut config = GatewayConfig::default();
        let mut a = RouteConfig::new("a", "/api/a", "http://127.0.0.1:1");
        a.breaker = Some("shared".into());
        let mut b = RouteConfig::new("b", "/api/b", "http://127.0.0.1:1");
        b.breaker = Some("shared".into());
        b.circuit_breaker = Some(BreakerOverrides {
            reset_timeout_ms: Some(5_000),
            ..Default::default()
        });
        config.routes.extend([a, b]);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ConflictingBreaker {
                name: "shared".into(),
                routes: vec!["a".into(), "b".into()],
            }]
        );
        assert_eq!(
            errors[0].to_string(),
            "breaker 'shared' configured differently by routes a, b"
        );
    }

    #[test]
    fn shared_breaker_with_matching_settings_is_valid() {
        let mut config = GatewayConfig::default();
        let overrides = BreakerOverrides {
            failure_threshold: Some(3),
            ..Default::default()
        };
        for (id, prefix) in [("a", "/api/a"), ("b", "/api/b")] {
            let mut route = RouteConfig::new(id, prefix, "http://127.0.0.1:1");
            route.breaker = Some("shared".into());
            route.circuit_breaker = Some(overrides.clone());
            config.routes.push(route);
        }
        assert!(validate_config(&config).is_ok());
    }
}
