//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize all subsystems in dependency order
//! - Hand the shared resources to the server as one state value
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Resources are created once here and closed once at shutdown

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::audit::{AuditDispatcher, SinkError};
use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::error::GatewayError;
use crate::forward::Forwarder;
use crate::http::server::AppState;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::AnalyticsAggregator;
use crate::routing::UpstreamRouter;
use crate::security::rate_limit::QuotaParseError;
use crate::security::{AccessPolicy, RateLimiter, TokenVerifier};
use crate::store::{CounterStore, StoreError};

/// Secret shipped in the default configuration.
const PLACEHOLDER_SECRET: &str = "CHANGE_ME_IN_PRODUCTION";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid auth settings: {0}")]
    Auth(GatewayError),

    #[error("invalid access policy: {0}")]
    Policy(GatewayError),

    #[error("invalid rate limit: {0}")]
    Quota(#[from] QuotaParseError),

    #[error("counter store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("audit sink: {0}")]
    Audit(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build every shared component from a configuration.
pub async fn build_state(config: GatewayConfig) -> Result<AppState, StartupError> {
    validate_config(&config).map_err(|errors| StartupError::Config(ConfigError::Validation(errors)))?;

    if config.auth.secret == PLACEHOLDER_SECRET {
        tracing::warn!("Using the placeholder signing secret; set GATEWAY_JWT_SECRET");
    }

    let verifier = TokenVerifier::from_config(&config.auth).map_err(StartupError::Auth)?;
    let policy = AccessPolicy::from_config(&config.access_policy).map_err(StartupError::Policy)?;
    let router = UpstreamRouter::from_config(&config.routes);

    let store = CounterStore::connect(config.store.redis_url.as_deref()).await?;
    let limiter = RateLimiter::from_config(&config.rate_limit, &config.store, store.clone())?;
    let analytics = AnalyticsAggregator::new(&config.analytics, &config.store, store.clone());
    let audit = AuditDispatcher::from_config(&config.audit)?;
    let forwarder = Forwarder::new(Duration::from_secs(config.listener.connect_timeout_secs));

    tracing::info!(
        routes = router.routes().len(),
        store = store.backend(),
        audit_sink = config.audit.sink_url.as_deref().unwrap_or("log"),
        "Gateway subsystems initialized"
    );

    Ok(AppState {
        config: Arc::new(config),
        router: Arc::new(router),
        verifier: Arc::new(verifier),
        policy: Arc::new(policy),
        limiter: Arc::new(limiter),
        forwarder,
        audit,
        analytics,
        store,
        shutdown: Shutdown::new(),
    })
}
