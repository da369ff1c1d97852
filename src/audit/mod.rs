//! Audit trail subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline.rs
//!     → record.rs (AuditContext builds request / response / error records)
//!     → dispatcher.rs (hands records to the background task set)
//!     → sink.rs (JSON POST to the audit service, or a log line)
//! ```
//!
//! # Design Decisions
//! - Exactly one terminal record per request: `response` or `error`
//! - The terminal record is delivered after the request record of the same trace
//! - Sink failures are logged locally and never reach the caller

pub mod dispatcher;
pub mod record;
pub mod sink;

pub use dispatcher::{AuditDispatcher, Delivered};
pub use record::{AuditContext, AuditRecord, EventType};
pub use sink::{AuditSink, SinkError};
