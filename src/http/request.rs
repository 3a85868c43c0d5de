//! Inbound request extraction.
//!
//! # Responsibilities
//! - Pull and validate the `url` query parameter
//! - Derive the proxy base from `Host` / `X-Forwarded-Proto`
//! - Build the outbound `ProxyRequest` from the forwarded header subset
//!
//! # Design Decisions
//! - Only User-Agent, Cookie and Content-Type travel upstream; everything
//!   else the caller sent stays on this side
//! - HEAD is fetched as GET; axum drops the body on the way out

use axum::http::header::{CONTENT_TYPE, COOKIE, HOST, USER_AGENT};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use url::{form_urlencoded, Url};

use crate::error::{ProxyError, ProxyResult};
use crate::fetch::ProxyRequest;
use crate::resolver::{self, ProxyBase};

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_REQUEST_ID: &str = "x-request-id";

/// The validated target from a raw query string.
pub fn target_from_query(query: Option<&str>) -> ProxyResult<Url> {
    let raw = query.and_then(|q| {
        form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())
    });
    let raw = raw.ok_or_else(|| ProxyError::InvalidUrl("missing url parameter".into()))?;
    if !resolver::validate(&raw) {
        return Err(ProxyError::InvalidUrl(raw));
    }
    resolver::parse_target(&raw).ok_or(ProxyError::InvalidUrl(raw))
}

/// Proxy base for this request, falling back to `default_host` when the
/// request carries no usable `Host`.
pub fn proxy_base(headers: &HeaderMap, default_host: &str) -> ProxyBase {
    let host = header_str(headers, HOST.as_str())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or(default_host);
    ProxyBase::from_host(host, header_str(headers, X_FORWARDED_PROTO))
}

/// Assemble the outbound request.
pub fn build_proxy_request(
    method: &Method,
    target: Url,
    headers: &HeaderMap,
    body: Bytes,
) -> ProxyRequest {
    let method = if *method == Method::HEAD {
        Method::GET
    } else {
        method.clone()
    };
    ProxyRequest {
        method,
        target,
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
        cookie: header_str(headers, COOKIE.as_str()).map(str::to_string),
        content_type: header_str(headers, CONTENT_TYPE.as_str()).map(str::to_string),
        body: (!body.is_empty()).then_some(body),
    }
}

pub fn request_id(headers: &HeaderMap) -> &str {
    header_str(headers, X_REQUEST_ID).unwrap_or("unknown")
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
