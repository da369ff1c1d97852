//! Upstream lookup and forwarding mode selection.
//!
//! # Responsibilities
//! - Store compiled routes (prefix → upstream)
//! - Look up the route for a request path
//! - Decide how a request is forwarded (buffered, upload, stream)
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix first, so nested prefixes resolve deterministically
//! - Explicit no-match rather than a silent default upstream

use std::sync::Arc;
use std::time::Duration;

use axum::http::{uri::PathAndQuery, Method, Uri};

use crate::config::RouteConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::routing::matcher::PathPattern;

/// Label used for requests no route prefix matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// How the forwarder relays a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Wait for the full upstream response, bounded by `timeout`.
    Buffered { timeout: Duration },
    /// Relay an event stream line by line until either side disconnects.
    /// Only the wait for the upstream response head is bounded.
    Streaming { head_timeout: Duration },
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    prefix: String,
    upstream: String,
    timeout: Duration,
    upload_timeout: Duration,
    stream_paths: Vec<PathPattern>,
    upload_paths: Vec<PathPattern>,
    pub stream_required_params: Vec<String>,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Self {
        Self {
            name: config.name.clone(),
            prefix: config.path_prefix.trim_end_matches('/').to_string(),
            upstream: config.upstream.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            stream_paths: config.stream_paths.iter().map(|p| PathPattern::parse(p)).collect(),
            upload_paths: config.upload_paths.iter().map(|p| PathPattern::parse(p)).collect(),
            stream_required_params: config.stream_required_params.clone(),
        }
    }

    /// Segment-aware prefix match: "/api/auth" matches "/api/auth" and
    /// "/api/auth/login" but not "/api/authz".
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Select the forwarding mode for a request on this route.
    pub fn mode_for(&self, method: &Method, path: &str, content_type: Option<&str>) -> ForwardMode {
        if method == Method::GET && self.stream_paths.iter().any(|p| p.matches(path)) {
            return ForwardMode::Streaming {
                head_timeout: self.timeout,
            };
        }

        let is_upload = self.upload_paths.iter().any(|p| p.matches(path))
            || content_type.is_some_and(|ct| ct.starts_with("multipart/form-data"));

        ForwardMode::Buffered {
            timeout: if is_upload { self.upload_timeout } else { self.timeout },
        }
    }

    /// Absolute upstream URI for the inbound path and query.
    pub fn upstream_uri(&self, path_and_query: Option<&PathAndQuery>) -> GatewayResult<Uri> {
        let tail = path_and_query.map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.upstream, tail)
            .parse::<Uri>()
            .map_err(|e| GatewayError::Internal(format!("invalid upstream URI for route {}: {}", self.name, e)))
    }
}

/// Prefix → upstream table.
#[derive(Debug, Default)]
pub struct UpstreamRouter {
    routes: Vec<Arc<Route>>,
}

impl UpstreamRouter {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Arc<Route>> = configs.iter().map(|c| Arc::new(Route::from_config(c))).collect();
        // Stable sort keeps declaration order among equal lengths.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        for route in &routes {
            tracing::debug!(route = %route.name, prefix = %route.prefix, upstream = %route.upstream, "Route compiled");
        }

        Self { routes }
    }

    pub fn match_path(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.matches(path)).cloned()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }
}
