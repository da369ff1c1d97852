//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, GATEWAY_* env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled once at startup into routes, policy, quotas
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets come from the environment, not the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::{
    AccessRuleConfig, AnalyticsConfig, AuditConfig, AuthConfig, GatewayConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, QuotaRuleConfig, RateLimitConfig, RouteConfig, StoreConfig,
};
pub use validation::{validate_config, ValidationError};
