//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, CORS)
//! - Bind server to listener
//! - Dispatch proxied requests to the pipeline
//! - Drain background work and close shared resources on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::audit::AuditDispatcher;
use crate::config::GatewayConfig;
use crate::forward::Forwarder;
use crate::http::pipeline;
use crate::lifecycle::shutdown::{wait_for, Shutdown};
use crate::lifecycle::startup::{build_state, StartupError};
use crate::observability::AnalyticsAggregator;
use crate::routing::UpstreamRouter;
use crate::security::{AccessPolicy, RateLimiter, TokenVerifier};
use crate::store::CounterStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub router: Arc<UpstreamRouter>,
    pub verifier: Arc<TokenVerifier>,
    pub policy: Arc<AccessPolicy>,
    pub limiter: Arc<RateLimiter>,
    pub forwarder: Forwarder,
    pub audit: AuditDispatcher,
    pub analytics: AnalyticsAggregator,
    pub store: CounterStore,
    /// Fired when the server stops, ending open event streams.
    pub shutdown: Shutdown,
}

impl AppState {
    /// Drain background work, then release the counter store.
    pub async fn close(self) {
        let drain_timeout = Duration::from_secs(self.config.audit.drain_timeout_secs);
        self.audit.drain().await;
        self.analytics.drain(drain_timeout).await;
        self.store.close().await;
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Initialize every subsystem from `config`.
    pub async fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let state = build_state(config).await?;
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(health))
            .route("/health", get(health))
            .route("/{*path}", any(pipeline::handle))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, then drain and close.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let streams = self.state.shutdown.clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                wait_for(shutdown).await;
                tracing::info!("Shutdown requested, closing open streams");
                streams.trigger();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        self.state.close().await;
        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "service": state.config.service_name }))
}
