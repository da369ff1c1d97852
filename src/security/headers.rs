//! Header manipulation between caller and upstream.
//!
//! # Responsibilities
//! - Strip `host`, hop-by-hop headers and `content-length` in both directions
//! - Strip identity headers callers could use to impersonate someone
//! - Relay repeated response headers (`set-cookie`) unchanged
//!
//! # Design Decisions
//! - Body lengths are recomputed by the server, never copied
//! - Headers named in `Connection` are hop-by-hop too

use axum::http::{header, HeaderMap, HeaderName};

pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_ROLE: &str = "x-user-role";
pub const X_FROM_GATEWAY: &str = "x-from-gateway";

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Header names listed in the `Connection` header.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, extra: &[String]) -> bool {
    HOP_BY_HOP.contains(name) || extra.iter().any(|t| t == name.as_str())
}

/// Copy of the inbound headers suitable for the upstream request.
pub fn forwardable_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let extra = connection_tokens(inbound);
    let mut out = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound.iter() {
        if name == header::HOST
            || name == header::CONTENT_LENGTH
            || name.as_str() == X_USER_ID
            || name.as_str() == X_USER_ROLE
            || is_hop_by_hop(name, &extra)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Append the relayable upstream response headers to `out`.
pub fn relay_response_headers(upstream: &HeaderMap, out: &mut HeaderMap) {
    let extra = connection_tokens(upstream);

    for (name, value) in upstream.iter() {
        if name == header::CONTENT_LENGTH || is_hop_by_hop(name, &extra) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
}
