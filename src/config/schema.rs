//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Name reported as `service` in audit records.
    pub service_name: String,

    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream routes, one per path prefix.
    pub routes: Vec<RouteConfig>,

    /// Credential verification settings.
    pub auth: AuthConfig,

    /// Ordered access rules (route pattern → allowed roles).
    pub access_policy: Vec<AccessRuleConfig>,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Shared counter store.
    pub store: StoreConfig,

    /// Audit trail settings.
    pub audit: AuditConfig,

    /// Analytics counters.
    pub analytics: AnalyticsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: "api-gateway".to_string(),
            listener: ListenerConfig::default(),
            routes: default_routes(),
            auth: AuthConfig::default(),
            access_policy: default_access_policy(),
            rate_limit: RateLimitConfig::default(),
            store: StoreConfig::default(),
            audit: AuditConfig::default(),
            analytics: AnalyticsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body the gateway will buffer.
    pub max_body_bytes: usize,

    /// Take the client IP from the first `X-Forwarded-For` entry.
    /// Only enable behind a load balancer that sets the header.
    pub trust_forwarded_for: bool,

    /// Upstream connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
            trust_forwarded_for: false,
            connect_timeout_secs: 5,
        }
    }
}

/// Route configuration mapping a path prefix to one upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (e.g. "/api/sbom/").
    pub path_prefix: String,

    /// Upstream base URL (e.g. "http://sbom-service:8002").
    pub upstream: String,

    /// Timeout for buffered calls in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for upload calls in seconds.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Path patterns relayed as event streams.
    #[serde(default)]
    pub stream_paths: Vec<String>,

    /// Path patterns that carry file uploads.
    #[serde(default)]
    pub upload_paths: Vec<String>,

    /// Query parameters a stream request must carry.
    #[serde(default = "default_stream_required_params")]
    pub stream_required_params: Vec<String>,
}

impl RouteConfig {
    /// Route with default timeouts and no stream/upload paths.
    pub fn new(name: &str, path_prefix: &str, upstream: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            upstream: upstream.to_string(),
            timeout_secs: default_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            stream_paths: Vec::new(),
            upload_paths: Vec::new(),
            stream_required_params: default_stream_required_params(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_upload_timeout_secs() -> u64 {
    60
}

fn default_stream_required_params() -> Vec<String> {
    vec!["project_name".to_string()]
}

fn default_routes() -> Vec<RouteConfig> {
    let mut sbom = RouteConfig::new("sbom", "/api/sbom/", "http://sbom-service:8002");
    sbom.upload_paths.push("/api/sbom/upload".to_string());

    let mut vuln = RouteConfig::new("vuln", "/api/vuln/", "http://vulnerability-service:8003");
    vuln.stream_paths.push("/api/vuln/stream".to_string());

    let mut billing = RouteConfig::new("billing", "/api/billing/", "http://billing-service:8005");
    billing.timeout_secs = 15;

    vec![
        RouteConfig::new("auth", "/api/auth/", "http://user-service:8001"),
        sbom,
        vuln,
        RouteConfig::new("risk", "/api/risk/", "http://risk-service:8004"),
        RouteConfig::new("report", "/api/report/", "http://report-service:8006"),
        billing,
    ]
}

/// Credential verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared signing secret.
    pub secret: String,

    /// Signing algorithm (HS256, HS384, HS512).
    pub algorithm: String,

    /// Cookie consulted when no bearer header is present.
    pub cookie_name: String,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Override with GATEWAY_JWT_SECRET.
            secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            algorithm: "HS256".to_string(),
            cookie_name: "access_token".to_string(),
            leeway_secs: 0,
        }
    }
}

/// One access rule. Patterns ending in `*` match by prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessRuleConfig {
    pub pattern: String,

    /// HTTP methods the rule applies to (empty = all).
    #[serde(default)]
    pub methods: Vec<String>,

    /// Roles allowed through.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Anonymous access, no credential required.
    #[serde(default)]
    pub public: bool,
}

impl AccessRuleConfig {
    pub fn roles(pattern: &str, roles: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            public: false,
        }
    }

    pub fn public(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            roles: Vec::new(),
            public: true,
        }
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }
}

fn default_access_policy() -> Vec<AccessRuleConfig> {
    vec![
        AccessRuleConfig::public("/api/auth/*"),
        // Called by the payment provider, authenticated by signature upstream.
        AccessRuleConfig::public("/api/billing/webhook"),
        AccessRuleConfig::public("/api/vuln/health"),
        // Live scan progress is readable without a session.
        AccessRuleConfig::public("/api/vuln/stream"),
        AccessRuleConfig::public("/api/report/health"),
        AccessRuleConfig::roles("/api/sbom/*", &["developer"]),
        AccessRuleConfig::roles("/api/vuln/*", &["developer"]),
        AccessRuleConfig::roles("/api/risk/*", &["developer"]),
        AccessRuleConfig::roles("/api/report/*", &["developer", "admin"]),
        AccessRuleConfig::roles("/api/report/*", &["admin"]).with_methods(&["DELETE"]),
        AccessRuleConfig::roles("/api/billing/*", &["developer", "admin"]),
    ]
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Quota applied when no route rule matches (e.g. "100 per 60s").
    pub default_quota: String,

    /// Let requests through when the counter store is unreachable.
    pub fail_open: bool,

    /// Per-route quotas.
    pub routes: Vec<QuotaRuleConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_quota: "100 per 60s".to_string(),
            fail_open: true,
            routes: vec![QuotaRuleConfig {
                pattern: "/api/auth/login".to_string(),
                quota: "5 per 60s".to_string(),
            }],
        }
    }
}

/// Quota for one route pattern.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaRuleConfig {
    pub pattern: String,
    pub quota: String,
}

/// Shared counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis connection string. Without it counters live in-process,
    /// which is only correct for a single gateway instance.
    pub redis_url: Option<String>,

    /// Prefix for every key the gateway writes.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "gateway".to_string(),
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit records.
    pub enabled: bool,

    /// Sink receiving records as JSON POSTs. Records are only logged when unset.
    pub sink_url: Option<String>,

    /// Delivery timeout in seconds.
    pub timeout_secs: u64,

    /// Body capture limit in characters.
    pub max_body_chars: usize,

    /// Maximum deliveries in flight; extra records are dropped.
    pub max_in_flight: usize,

    /// Time allowed at shutdown for in-flight deliveries.
    pub drain_timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink_url: Some("http://audit-service:8005/audit".to_string()),
            timeout_secs: 5,
            max_body_chars: 1000,
            max_in_flight: 256,
            drain_timeout_secs: 5,
        }
    }
}

/// Analytics counters configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,

    /// Maximum counter updates in flight.
    pub max_in_flight: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_in_flight: 256,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
