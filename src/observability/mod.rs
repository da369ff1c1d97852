//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Pipeline, after each request:
//!     → analytics.rs (hit / status counters in the shared store)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace id flows through logs, upstream headers and audit records
//! - Metrics are cheap (atomic increments)

pub mod analytics;
pub mod logging;
pub mod metrics;

pub use analytics::AnalyticsAggregator;
