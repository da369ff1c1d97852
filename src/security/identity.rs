//! Caller identity verification.
//!
//! # Responsibilities
//! - Extract the bearer credential (Authorization header, then cookie)
//! - Verify signature and expiry against the shared secret
//! - Produce the request-scoped [`Identity`]
//!
//! Pure local computation: no network calls, nothing persisted.

use std::str::FromStr;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AuthConfig;
use crate::error::{GatewayError, GatewayResult};

/// Claim set carried by gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Expiry, seconds since epoch.
    pub exp: u64,
    /// Any custom claims, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Authenticated caller for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    /// Empty when the credential carried no role.
    pub role: String,
    pub expires_at: DateTime<Utc>,
    pub extra: Map<String, Value>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role.unwrap_or_default(),
            expires_at: DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_default(),
            extra: claims.extra,
        }
    }
}

/// Pull the raw token from `Authorization: Bearer <token>` or the named cookie.
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Verifies credentials against the configured secret and algorithm.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

impl TokenVerifier {
    pub fn from_config(config: &AuthConfig) -> GatewayResult<Self> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| GatewayError::Internal(format!("unsupported algorithm {}", config.algorithm)))?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            cookie_name: config.cookie_name.clone(),
        })
    }

    /// Verify a raw token.
    pub fn verify(&self, token: &str) -> GatewayResult<Identity> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let detail = match e.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid token signature",
                _ => "Invalid token",
            };
            tracing::debug!(error = %e, "Credential rejected");
            GatewayError::Unauthenticated(detail.to_string())
        })?;

        Ok(data.claims.into())
    }

    /// Extract and verify the caller's credential.
    pub fn authenticate(&self, headers: &HeaderMap) -> GatewayResult<Identity> {
        let token = extract_credential(headers, &self.cookie_name)
            .ok_or_else(|| GatewayError::Unauthenticated("Missing token".to_string()))?;
        self.verify(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_key";

    fn verifier() -> TokenVerifier {
        TokenVerifier::from_config(&AuthConfig {
            secret: SECRET.into(),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn token(sub: &str, role: Option<&str>, exp_offset: i64, secret: &str) -> String {
        let exp = (Utc::now().timestamp() + exp_offset) as u64;
        let mut extra = Map::new();
        extra.insert("tenant".into(), Value::from("acme"));
        let claims = Claims {
            sub: sub.into(),
            role: role.map(Into::into),
            exp,
            extra,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_valid_token() {
        let identity = verifier().verify(&token("alice", Some("developer"), 600, SECRET)).unwrap();
        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.role, "developer");
        assert_eq!(identity.extra.get("tenant").unwrap(), "acme");
        assert!(identity.expires_at > Utc::now());
    }

    #[test]
    fn test_expired_token() {
        let err = verifier().verify(&token("alice", Some("developer"), -600, SECRET)).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(ref m) if m == "Token expired"));
    }

    #[test]
    fn test_wrong_secret() {
        let err = verifier().verify(&token("alice", Some("developer"), 600, "other")).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(_)));
    }

    #[test]
    fn test_malformed_token() {
        assert!(verifier().verify("not.a.jwt").is_err());
        assert!(verifier().verify("").is_err());
    }

    #[test]
    fn test_missing_role_is_empty() {
        let identity = verifier().verify(&token("bob", None, 600, SECRET)).unwrap();
        assert!(identity.role.is_empty());
    }

    #[test]
    fn test_credential_sources() {
        let mut headers = HeaderMap::new();
        assert!(extract_credential(&headers, "access_token").is_none());

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; access_token=cookie-tok"));
        assert_eq!(extract_credential(&headers, "access_token").as_deref(), Some("cookie-tok"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-tok"));
        assert_eq!(extract_credential(&headers, "access_token").as_deref(), Some("header-tok"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_credential(&headers, "access_token").as_deref(), Some("cookie-tok"));
    }

    #[test]
    fn test_authenticate_without_credential() {
        let err = verifier().authenticate(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(ref m) if m == "Missing token"));
    }
}
