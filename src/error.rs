//! Proxy error taxonomy.
//!
//! # Design Decisions
//! - One enum for everything the request path can fail with
//! - Client errors (bad target) map to 400, fetch failures to 500
//! - `Rewrite` never reaches the caller: the dispatcher downgrades it to passthrough

use thiserror::Error;

/// Errors that can occur while proxying a single request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Target URL missing, malformed, or not `http`/`https`.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Upstream did not answer within the configured deadline.
    #[error("Upstream request to {url} timed out after {secs} seconds")]
    UpstreamTimeout { url: String, secs: u64 },

    /// Upstream could not be reached (DNS, connect, TLS, reset).
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Redirect chain longer than the configured bound.
    #[error("Too many redirects fetching {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },

    /// Upstream body exceeded the configured byte ceiling.
    #[error("Upstream response exceeds {limit} bytes")]
    OversizedResponse { limit: u64 },

    /// Headless browser failed to start, navigate or read the page.
    #[error("Browser error: {0}")]
    Browser(String),

    /// A rewriter could not process the body.
    #[error("Rewrite failed: {0}")]
    Rewrite(String),
}

impl ProxyError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidUrl(_) => "invalid_url",
            ProxyError::UpstreamTimeout { .. } => "upstream_timeout",
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
            ProxyError::TooManyRedirects { .. } => "too_many_redirects",
            ProxyError::OversizedResponse { .. } => "oversized_response",
            ProxyError::Browser(_) => "browser",
            ProxyError::Rewrite(_) => "rewrite",
        }
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
