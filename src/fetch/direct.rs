//! Direct HTTP fetch strategy.
//!
//! # Responsibilities
//! - Issue the outbound request with a controlled header set
//! - Enforce redirect, size and timeout bounds
//! - Classify failures into `ProxyError` variants
//!
//! # Design Decisions
//! - One pooled `reqwest::Client` per process (keep-alive reuse)
//! - Certificate validation is relaxed on this client only, never on the
//!   proxy's own listener
//! - The body is read chunk by chunk so the size ceiling holds even when
//!   upstream sends no Content-Length

use std::error::Error as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, COOKIE, REFERER, USER_AGENT,
};
use bytes::{Bytes, BytesMut};
use reqwest::redirect::Policy;
use url::Url;

use super::{Fetcher, ProxyRequest, UpstreamResponse};
use crate::config::FetchConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::observability::metrics;

const ACCEPT_VALUE: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Fetches with a plain HTTP client.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: reqwest::Client,
    max_response_bytes: u64,
    timeout_secs: u64,
    max_redirects: usize,
}

impl DirectFetcher {
    /// Build the pooled client from the fetch policy.
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
            timeout_secs: config.timeout_secs,
            max_redirects: config.max_redirects,
        })
    }

    async fn execute(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        let target = &request.target;
        let mut builder = self
            .client
            .request(request.method.clone(), target.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(CACHE_CONTROL, "no-cache")
            .header(REFERER, target.origin().ascii_serialization());

        if let Some(ua) = &request.user_agent {
            builder = builder.header(USER_AGENT, ua);
        }
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if request.is_mutating() {
            if let Some(body) = request.body.as_ref().filter(|b| !b.is_empty()) {
                if let Some(content_type) = &request.content_type {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
                builder = builder.body(body.clone());
            }
        }

        let mut response = builder.send().await.map_err(|e| self.classify(target, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        if let Some(len) = response.content_length() {
            if len > self.max_response_bytes {
                return Err(ProxyError::OversizedResponse {
                    limit: self.max_response_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify(target, e))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_response_bytes {
                return Err(ProxyError::OversizedResponse {
                    limit: self.max_response_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::debug!(
            url = %target,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            "Upstream fetch complete"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body: body.freeze(),
            content_type,
            final_url,
        })
    }

    fn classify(&self, target: &Url, error: reqwest::Error) -> ProxyError {
        if error.is_timeout() {
            ProxyError::UpstreamTimeout {
                url: target.to_string(),
                secs: self.timeout_secs,
            }
        } else if error.is_redirect() {
            ProxyError::TooManyRedirects {
                url: target.to_string(),
                limit: self.max_redirects,
            }
        } else {
            ProxyError::UpstreamUnreachable(error_chain(&error))
        }
    }

    /// Fetch a GET target and return only a successful body.
    pub(crate) async fn fetch_bytes(&self, target: &Url) -> ProxyResult<Option<Bytes>> {
        let response = self.execute(&ProxyRequest::get(target.clone())).await?;
        Ok(response.status.is_success().then_some(response.body))
    }
}

#[async_trait]
impl Fetcher for DirectFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        let start = Instant::now();
        let result = self.execute(request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_upstream(self.strategy(), outcome, start);
        result
    }

    fn strategy(&self) -> &'static str {
        "direct"
    }
}

/// `error` and its sources joined into one line.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
