//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides the signing secret.
pub const ENV_JWT_SECRET: &str = "GATEWAY_JWT_SECRET";
/// Overrides the counter store connection string.
pub const ENV_REDIS_URL: &str = "GATEWAY_REDIS_URL";
/// Overrides the audit sink URL.
pub const ENV_AUDIT_URL: &str = "GATEWAY_AUDIT_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

/// Load, override and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(path = %path.display(), routes = config.routes.len(), "Configuration loaded");
    Ok(config)
}

/// Defaults plus environment overrides, validated.
pub fn default_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Secrets and URLs that deployments inject through the environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(ENV_JWT_SECRET).filter(|v| !v.is_empty()) {
        config.auth.secret = secret;
    }
    if let Some(url) = lookup(ENV_REDIS_URL).filter(|v| !v.is_empty()) {
        config.store.redis_url = Some(url);
    }
    if let Some(url) = lookup(ENV_AUDIT_URL).filter(|v| !v.is_empty()) {
        config.audit.sink_url = Some(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
            service_name = "edge"

            [listener]
            bind_address = "127.0.0.1:9000"

            [[routes]]
            name = "risk"
            path_prefix = "/api/risk/"
            upstream = "http://127.0.0.1:8004"
            timeout_secs = 15

            [rate_limit]
            default_quota = "10 per minute"
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.service_name, "edge");
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].timeout_secs, 15);
        assert_eq!(config.routes[0].upload_timeout_secs, 60);
        assert_eq!(config.routes[0].stream_required_params, vec!["project_name".to_string()]);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.auth.algorithm, "HS256");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let file = write_config(
            r#"
            [auth]
            algorithm = "none"
            "#,
        );
        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors[0].field, "auth.algorithm"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("routes = 7");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/gateway.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_JWT_SECRET, "s3cret"),
            (ENV_REDIS_URL, "redis://cache:6379"),
            (ENV_AUDIT_URL, ""),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379"));
        // Empty values leave the configured URL alone.
        assert_eq!(config.audit.sink_url.as_deref(), Some("http://audit-service:8005/audit"));
    }
}
