//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (prefix → upstream, forwarding mode)
//!     → matcher.rs (exact / wildcard pattern tables for policy and quotas)
//!     → Return: matched Route or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by prefix length
//!     → Compile stream/upload patterns
//!     → Freeze as immutable UpstreamRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternTable};
pub use router::{ForwardMode, Route, UpstreamRouter, UNMATCHED_ROUTE};
