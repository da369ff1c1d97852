//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, health endpoints, middleware)
//!     → request.rs (trace id, client address, body read once)
//!     → pipeline.rs (admission, routing, authorization, forwarding)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
