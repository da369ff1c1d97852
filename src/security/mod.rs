//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (verify credential, once, up front)
//!     → rate_limit.rs (count per subject or client IP)
//!     → access_control.rs (route policy vs. identity)
//!     → headers.rs (strip hop-by-hop and spoofable identity headers)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: routes without a policy rule are denied
//! - No trust in client-supplied identity headers

pub mod access_control;
pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use access_control::{AccessPolicy, Requirement};
pub use identity::{Identity, TokenVerifier};
pub use rate_limit::{Quota, RateLimiter};
