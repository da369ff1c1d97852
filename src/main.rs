//! API gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!         │
//!         ▼
//!    ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//!    │   http   │──▶│ identity │──▶│ rate limit │──▶│ routing  │──▶│  access  │
//!    │  server  │   │  verify  │   │  (store)   │   │  table   │   │  policy  │
//!    └──────────┘   └──────────┘   └────────────┘   └──────────┘   └────┬─────┘
//!                                                                       │
//!                                                                       ▼
//!    ┌───────────────────────────────┐                          ┌──────────────┐
//!    │ audit + analytics (background) │◀─────────────────────────│   forward    │──▶ Upstream
//!    └───────────────────────────────┘                          │ buffered/SSE │
//!                                                               └──────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{default_config, load_config};
use api_gateway::lifecycle::signals::spawn_signal_listener;
use api_gateway::observability::{logging::init_logging, metrics::init_metrics};
use api_gateway::{GatewayServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "Authenticating API gateway")]
struct Cli {
    /// Path to the TOML configuration file; defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    init_logging(&config.observability)?;
    tracing::info!(service = %config.service_name, "api-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = GatewayServer::new(config).await?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
