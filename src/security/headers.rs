//! Response header policy.
//!
//! # Responsibilities
//! - Strip upstream headers that would block framing, scripting or
//!   cross-origin use of the proxied content
//! - Strip hop-by-hop headers and those invalidated by rewriting
//! - Inject a permissive CORS/CSP header set
//!
//! # Design Decisions
//! - Applied on every response the proxy produces, errors included
//! - Upstream `set-cookie` is dropped: cookies would be scoped to the proxy
//!   origin, not the target
//! - `X-Frame-Options` is removed and not replaced; absence allows framing

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, Origin, Accept";
pub const MAX_AGE_SECS: &str = "86400";

pub const PERMISSIVE_CSP: &str = "default-src * data: blob: 'unsafe-inline' 'unsafe-eval'; \
script-src * data: blob: 'unsafe-inline' 'unsafe-eval'; \
style-src * data: blob: 'unsafe-inline'; \
img-src * data: blob:; \
connect-src * data: blob:; \
frame-ancestors *";

/// Upstream headers never forwarded.
const STRIPPED: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "clear-site-data",
    "cross-origin-embedder-policy",
    "cross-origin-opener-policy",
    "cross-origin-resource-policy",
    "x-content-type-options",
    "x-frame-options",
    "strict-transport-security",
    "set-cookie",
    "content-encoding",
    "content-length",
];

/// Connection-scoped headers (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True if `name` must not be copied from the upstream response.
pub fn is_stripped(name: &HeaderName) -> bool {
    let name = name.as_str();
    STRIPPED.contains(&name) || HOP_BY_HOP.contains(&name) || name.starts_with("access-control-allow-")
}

/// Copy of `upstream` without stripped headers or headers named in
/// `Connection`.
pub fn sanitize(upstream: &HeaderMap) -> HeaderMap {
    let connection_scoped: Vec<String> = upstream
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_stripped(name) || connection_scoped.iter().any(|t| t == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Add the permissive header set, replacing any existing values.
pub fn inject(headers: &mut HeaderMap) {
    let set = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
        (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
        (header::ACCESS_CONTROL_MAX_AGE, MAX_AGE_SECS),
        (header::CONTENT_SECURITY_POLICY, PERMISSIVE_CSP),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::REFERRER_POLICY, "no-referrer"),
    ];
    for (name, value) in set {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
