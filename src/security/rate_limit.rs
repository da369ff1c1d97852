//! Fixed-window rate limiting backed by the shared counter store.
//!
//! # Responsibilities
//! - Parse quota strings ("5 per 60s", "100/minute")
//! - Pick the quota for a route (longest matching rule, else the default)
//! - Count the request and decide admission
//!
//! # Design Decisions
//! - The window is anchored at the first hit; its remaining TTL is the retry hint
//! - Keys are scoped by subject (or client IP) and route pattern
//! - Store failures admit the request unless `fail_open` is disabled

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::http::Method;
use thiserror::Error;

use crate::config::{RateLimitConfig, StoreConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::routing::matcher::{PathPattern, PatternTable};
use crate::routing::UNMATCHED_ROUTE;
use crate::store::CounterStore;

/// Errors from parsing a quota string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaParseError {
    #[error("quota '{0}' is not of the form '<count> per <window>'")]
    Format(String),

    #[error("invalid count in quota '{0}'")]
    Count(String),

    #[error("invalid window in quota '{0}'")]
    Window(String),
}

/// Allowed requests per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub window: Duration,
}

impl Quota {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}s", self.limit, self.window.as_secs())
    }
}

/// Parse a window such as "60s", "60 seconds", "minute", "2h".
fn parse_window(raw: &str) -> Option<Duration> {
    let raw = raw.trim().to_ascii_lowercase();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let amount: u64 = if digits.is_empty() { 1 } else { digits.parse().ok()? };
    let unit_secs = match unit.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        _ => return None,
    };

    let secs = amount.checked_mul(unit_secs)?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl FromStr for Quota {
    type Err = QuotaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (count, window) = trimmed
            .split_once('/')
            .or_else(|| trimmed.split_once(" per "))
            .ok_or_else(|| QuotaParseError::Format(s.to_string()))?;

        let limit: u64 = count
            .trim()
            .parse()
            .map_err(|_| QuotaParseError::Count(s.to_string()))?;
        if limit == 0 {
            return Err(QuotaParseError::Count(s.to_string()));
        }

        let window = parse_window(window).ok_or_else(|| QuotaParseError::Window(s.to_string()))?;
        Ok(Quota { limit, window })
    }
}

/// Per-caller, per-route admission control.
#[derive(Debug)]
pub struct RateLimiter {
    store: CounterStore,
    default_quota: Quota,
    rules: PatternTable<Quota>,
    enabled: bool,
    fail_open: bool,
    key_prefix: String,
}

impl RateLimiter {
    pub fn from_config(
        config: &RateLimitConfig,
        store_config: &StoreConfig,
        store: CounterStore,
    ) -> Result<Self, QuotaParseError> {
        let default_quota: Quota = config.default_quota.parse()?;

        let mut rules = PatternTable::new();
        for rule in &config.routes {
            rules.push(PathPattern::parse(&rule.pattern), Vec::new(), rule.quota.parse()?);
        }

        Ok(Self {
            store,
            default_quota,
            rules,
            enabled: config.enabled,
            fail_open: config.fail_open,
            key_prefix: store_config.key_prefix.clone(),
        })
    }

    /// Quota and bucket name for a request.
    ///
    /// Buckets are bounded by configuration: a quota rule's pattern, else the
    /// matched route's name, else one shared bucket for unrouted paths.
    pub fn quota_for(&self, method: &Method, path: &str, route: Option<&str>) -> (Quota, String) {
        match self.rules.lookup(method, path) {
            Some(rule) => (rule.value, rule.pattern.to_string()),
            None => (self.default_quota, route.unwrap_or(UNMATCHED_ROUTE).to_string()),
        }
    }

    /// Count one request for `key` on `path` and decide admission.
    pub async fn check(&self, key: &str, method: &Method, path: &str, route: Option<&str>) -> GatewayResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let (quota, bucket) = self.quota_for(method, path, route);
        let store_key = format!("{}:rl:{}:{}", self.key_prefix, key, bucket);

        match self.store.incr_with_expiry(&store_key, quota.window).await {
            Ok(hit) if hit.count <= quota.limit => Ok(()),
            Ok(hit) => {
                let retry_after_secs = retry_after(hit.ttl);
                tracing::warn!(
                    client = %key,
                    bucket = %bucket,
                    limit = quota.limit,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited(&bucket);
                Err(GatewayError::RateLimited { retry_after_secs })
            }
            Err(e) if self.fail_open => {
                tracing::error!(error = %e, "Counter store unavailable, admitting request");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Counter store unavailable, rejecting request");
                Err(GatewayError::Internal("rate limiter unavailable".to_string()))
            }
        }
    }
}

/// Whole seconds until the window resets, never less than one.
fn retry_after(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
