//! Role-based access policy.
//!
//! A static table mapping route patterns to the roles allowed to call them.
//! Loaded once at startup and shared read-only by every request.
//! Unmatched routes are denied.

use std::str::FromStr;

use axum::http::Method;

use crate::config::AccessRuleConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::routing::matcher::{PathPattern, PatternTable};
use crate::security::identity::Identity;

/// What a route demands from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Anonymous access.
    Public,
    /// A verified identity holding one of these roles.
    Roles(Vec<String>),
}

/// Outcome of a policy lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum Requirement<'a> {
    Public,
    Roles(&'a [String]),
    /// No rule covers the route.
    Deny,
}

#[derive(Debug, Default)]
pub struct AccessPolicy {
    table: PatternTable<Access>,
}

impl AccessPolicy {
    pub fn from_config(rules: &[AccessRuleConfig]) -> GatewayResult<Self> {
        let mut table = PatternTable::new();

        for rule in rules {
            let methods = rule
                .methods
                .iter()
                .map(|m| {
                    Method::from_str(&m.to_ascii_uppercase())
                        .map_err(|_| GatewayError::Internal(format!("invalid method {} in access rule {}", m, rule.pattern)))
                })
                .collect::<GatewayResult<Vec<_>>>()?;

            let access = if rule.public {
                Access::Public
            } else {
                Access::Roles(rule.roles.clone())
            };
            table.push(PathPattern::parse(&rule.pattern), methods, access);
        }

        tracing::debug!(rules = table.len(), "Access policy loaded");
        Ok(Self { table })
    }

    pub fn requirement(&self, method: &Method, path: &str) -> Requirement<'_> {
        match self.table.lookup(method, path).map(|rule| &rule.value) {
            Some(Access::Public) => Requirement::Public,
            Some(Access::Roles(roles)) => Requirement::Roles(roles),
            None => Requirement::Deny,
        }
    }

    /// Decide whether `identity` may call the route.
    pub fn authorize(&self, method: &Method, path: &str, identity: &Identity) -> GatewayResult<()> {
        let requirement = self.requirement(method, path);
        if requirement == Requirement::Public {
            return Ok(());
        }

        if identity.role.is_empty() {
            return Err(GatewayError::Forbidden("Token missing user role".to_string()));
        }

        match requirement {
            Requirement::Roles(allowed) if allowed.iter().any(|r| *r == identity.role) => Ok(()),
            Requirement::Roles(_) => Err(GatewayError::Forbidden(format!(
                "Access denied for role '{}'",
                identity.role
            ))),
            _ => Err(GatewayError::Forbidden(format!("No access rule for {} {}", method, path))),
        }
    }
}
