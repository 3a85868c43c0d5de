//! Upstream retrieval.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → Fetcher::fetch
//!         direct.rs   (reqwest, explicit header/redirect/size/timeout policy)
//!         rendered.rs (shared headless browser, asset cache in assets.rs)
//!     → UpstreamResponse
//! ```
//!
//! # Design Decisions
//! - One capability trait, two implementations chosen by configuration
//! - Process-scoped resources (the browser) live behind the trait and are
//!   released through `Fetcher::shutdown`, never reached as globals
//! - Failures are reported as `ProxyError`, never retried here

pub mod assets;
pub mod direct;
pub mod rendered;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use url::Url;

use crate::config::{FetchStrategy, ProxyConfig};
use crate::error::ProxyResult;

pub use direct::DirectFetcher;
pub use rendered::RenderedFetcher;

/// One outbound request, built from one inbound call.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Absolute, validated `http(s)` target.
    pub target: Url,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl ProxyRequest {
    /// A bodiless GET for `target`.
    pub fn get(target: Url) -> Self {
        Self {
            method: Method::GET,
            target,
            user_agent: None,
            cookie: None,
            content_type: None,
            body: None,
        }
    }

    /// True for methods that carry a body upstream.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

/// What came back from upstream, before any rewriting.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Effective Content-Type, if any was declared.
    pub content_type: Option<String>,
    /// URL after redirects; references in the body resolve against this.
    pub final_url: Url,
}

/// Retrieves upstream content for a proxied request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the target of `request`.
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse>;

    /// Label used in logs and metrics.
    fn strategy(&self) -> &'static str;

    /// Release process-scoped resources. Called once at shutdown.
    async fn shutdown(&self) {}
}

/// Build the fetcher selected by `config.fetch.strategy`.
pub fn build_fetcher(config: &ProxyConfig) -> Result<Arc<dyn Fetcher>, reqwest::Error> {
    let direct = DirectFetcher::new(&config.fetch)?;
    let fetcher: Arc<dyn Fetcher> = match config.fetch.strategy {
        FetchStrategy::Direct => Arc::new(direct),
        FetchStrategy::Rendered => Arc::new(RenderedFetcher::new(
            config.rendered.clone(),
            config.fetch.timeout_secs,
            direct,
        )),
    };
    tracing::info!(strategy = fetcher.strategy(), "Fetcher initialized");
    Ok(fetcher)
}
