//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, quotas parse, addresses parse)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::{Method, Uri};
use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::WILDCARD;
use crate::security::rate_limit::Quota;

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Algorithms accepted for the shared-secret credential.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::new("service_name", "must not be empty"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.listener.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.connect_timeout_secs", "must be greater than 0"));
    }

    validate_routes(config, &mut errors);
    validate_auth(config, &mut errors);
    validate_access_policy(config, &mut errors);
    validate_rate_limit(config, &mut errors);

    if let Some(url) = &config.store.redis_url {
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            errors.push(ValidationError::new("store.redis_url", "must be a redis:// or rediss:// URL"));
        }
    }

    if config.audit.enabled {
        if let Some(url) = &config.audit.sink_url {
            if !is_http_url(url) {
                errors.push(ValidationError::new("audit.sink_url", format!("'{}' is not an http(s) URL", url)));
            }
        }
        if config.audit.timeout_secs == 0 {
            errors.push(ValidationError::new("audit.timeout_secs", "must be greater than 0"));
        }
        if config.audit.max_in_flight == 0 {
            errors.push(ValidationError::new("audit.max_in_flight", "must be greater than 0"));
        }
    }
    if config.analytics.enabled && config.analytics.max_in_flight == 0 {
        errors.push(ValidationError::new("analytics.max_in_flight", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(raw: &str) -> bool {
    match raw.parse::<Uri>() {
        Ok(uri) => matches!(uri.scheme_str(), Some("http") | Some("https")) && uri.authority().is_some(),
        Err(_) => false,
    }
}

fn validate_routes(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    let mut prefixes = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        let prefix = route.path_prefix.trim_end_matches('/');

        if !route.path_prefix.starts_with('/') || prefix.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.path_prefix", field),
                format!("'{}' must start with '/' and name a path", route.path_prefix),
            ));
        }
        if !prefixes.insert(prefix.to_string()) {
            errors.push(ValidationError::new(
                format!("{}.path_prefix", field),
                format!("duplicate prefix '{}'", route.path_prefix),
            ));
        }

        // Only plain HTTP upstreams are supported; no TLS client is configured.
        match route.upstream.parse::<Uri>() {
            Ok(uri) if uri.scheme_str() == Some("http") && uri.authority().is_some() => {}
            _ => errors.push(ValidationError::new(
                format!("{}.upstream", field),
                format!("'{}' is not an http:// URL", route.upstream),
            )),
        }

        if route.timeout_secs == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_secs", field), "must be greater than 0"));
        }
        if route.upload_timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.upload_timeout_secs", field),
                "must be greater than 0",
            ));
        }
    }
}

fn validate_auth(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.auth.secret.is_empty() {
        errors.push(ValidationError::new("auth.secret", "must not be empty"));
    }
    match Algorithm::from_str(&config.auth.algorithm) {
        Ok(alg) if HMAC_ALGORITHMS.contains(&alg) => {}
        _ => errors.push(ValidationError::new(
            "auth.algorithm",
            format!("'{}' is not one of HS256, HS384, HS512", config.auth.algorithm),
        )),
    }
    if config.auth.cookie_name.is_empty() {
        errors.push(ValidationError::new("auth.cookie_name", "must not be empty"));
    }
}

fn check_pattern(field: &str, pattern: &str, errors: &mut Vec<ValidationError>) {
    let body = pattern.strip_suffix(WILDCARD).unwrap_or(pattern);
    if !pattern.starts_with('/') {
        errors.push(ValidationError::new(field, format!("'{}' must start with '/'", pattern)));
    }
    if body.contains(WILDCARD) {
        errors.push(ValidationError::new(
            field,
            format!("'{}': '{}' is only allowed at the end", pattern, WILDCARD),
        ));
    }
}

fn validate_access_policy(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    for (i, rule) in config.access_policy.iter().enumerate() {
        let field = format!("access_policy[{}]", i);
        check_pattern(&format!("{}.pattern", field), &rule.pattern, errors);

        if !rule.public && rule.roles.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.roles", field),
                "a non-public rule needs at least one role",
            ));
        }
        for method in &rule.methods {
            if Method::from_str(&method.to_ascii_uppercase()).is_err() {
                errors.push(ValidationError::new(
                    format!("{}.methods", field),
                    format!("'{}' is not an HTTP method", method),
                ));
            }
        }
    }
}

fn validate_rate_limit(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if let Err(e) = config.rate_limit.default_quota.parse::<Quota>() {
        errors.push(ValidationError::new("rate_limit.default_quota", e.to_string()));
    }
    for (i, rule) in config.rate_limit.routes.iter().enumerate() {
        let field = format!("rate_limit.routes[{}]", i);
        check_pattern(&format!("{}.pattern", field), &rule.pattern, errors);
        if let Err(e) = rule.quota.parse::<Quota>() {
            errors.push(ValidationError::new(format!("{}.quota", field), e.to_string()));
        }
    }
}
