//! Headless-browser fetch strategy.
//!
//! # Responsibilities
//! - Own the single shared browser: launched lazily, closed exactly once
//! - Navigate, wait for a minimal readiness condition, read the rendered DOM
//! - Prefetch same-origin assets into the on-disk cache
//!
//! # Design Decisions
//! - `tokio::sync::OnceCell` gives single-winner initialization; concurrent
//!   first requests await the same launch
//! - One fresh page per request, closed afterwards
//! - Asset-like GETs are answered from the cache when possible, and
//!   non-GET requests go to the direct strategy: a navigation cannot carry a
//!   method or body

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use url::Url;

use super::assets::AssetCache;
use super::{DirectFetcher, Fetcher, ProxyRequest, UpstreamResponse};
use crate::config::RenderedConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::observability::metrics;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READY_SCRIPT: &str = "document.body !== null";

const STATUS_SCRIPT: &str = "(() => { \
    const nav = performance.getEntriesByType('navigation')[0]; \
    return nav && nav.responseStatus ? nav.responseStatus : 200; \
})()";

const ASSETS_SCRIPT: &str =
    "Array.from(new Set(performance.getEntriesByType('resource').map(e => e.name)))";

/// A launched browser and the task driving its CDP connection.
struct BrowserSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

/// The process-wide browser, behind a single acquisition point.
pub struct SharedBrowser {
    config: RenderedConfig,
    session: OnceCell<BrowserSession>,
    closed: AtomicBool,
}

impl SharedBrowser {
    pub fn new(config: RenderedConfig) -> Self {
        Self {
            config,
            session: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// True once the browser has been launched.
    pub fn is_started(&self) -> bool {
        self.session.initialized()
    }

    /// Open a fresh page, launching the browser on first use.
    async fn new_page(&self) -> ProxyResult<Page> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProxyError::Browser("browser has been shut down".into()));
        }
        let session = self.session.get_or_try_init(|| launch(&self.config)).await?;
        let browser = session.browser.lock().await;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| ProxyError::Browser(format!("failed to open page: {e}")))
    }

    /// Close the browser. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(session) = self.session.get() else {
            return;
        };
        let mut browser = session.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "Browser process wait failed");
        }
        session.handler.abort();
        tracing::info!("Browser closed");
    }
}

async fn launch(config: &RenderedConfig) -> ProxyResult<BrowserSession> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu");
    if let Some(path) = &config.chrome_executable {
        builder = builder.chrome_executable(path);
    }
    for arg in &config.extra_args {
        builder = builder.arg(arg.as_str());
    }
    let browser_config = builder
        .build()
        .map_err(|e| ProxyError::Browser(format!("invalid browser config: {e}")))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| ProxyError::Browser(format!("failed to launch browser: {e}")))?;
    let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

    tracing::info!("Headless browser launched");
    Ok(BrowserSession {
        browser: Mutex::new(browser),
        handler,
    })
}

/// Fetches by rendering the target in the shared headless browser.
pub struct RenderedFetcher {
    browser: SharedBrowser,
    direct: Arc<DirectFetcher>,
    assets: Arc<AssetCache>,
    ready_timeout: Duration,
    navigation_timeout: Duration,
    prefetch_assets: bool,
}

impl RenderedFetcher {
    pub fn new(config: RenderedConfig, timeout_secs: u64, direct: DirectFetcher) -> Self {
        Self {
            assets: Arc::new(AssetCache::new(&config.asset_cache_dir)),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            navigation_timeout: Duration::from_secs(timeout_secs),
            prefetch_assets: config.prefetch_assets,
            direct: Arc::new(direct),
            browser: SharedBrowser::new(config),
        }
    }

    pub fn browser(&self) -> &SharedBrowser {
        &self.browser
    }

    async fn render(&self, target: &Url) -> ProxyResult<UpstreamResponse> {
        let page = self.browser.new_page().await?;
        let result = self.render_on(&page, target).await;
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close page");
        }
        result
    }

    async fn render_on(&self, page: &Page, target: &Url) -> ProxyResult<UpstreamResponse> {
        match tokio::time::timeout(self.navigation_timeout, page.goto(target.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ProxyError::Browser(format!("navigation failed: {e}"))),
            Err(_) => {
                return Err(ProxyError::UpstreamTimeout {
                    url: target.to_string(),
                    secs: self.navigation_timeout.as_secs(),
                })
            }
        }

        self.wait_ready(page).await;

        let html = page
            .content()
            .await
            .map_err(|e| ProxyError::Browser(format!("failed to read document: {e}")))?;

        let status = page
            .evaluate(STATUS_SCRIPT)
            .await
            .ok()
            .and_then(|r| r.into_value::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::OK);

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| target.clone());

        if self.prefetch_assets {
            let discovered = page
                .evaluate(ASSETS_SCRIPT)
                .await
                .ok()
                .and_then(|r| r.into_value::<Vec<String>>().ok())
                .unwrap_or_default();
            self.prefetch(same_origin_assets(&final_url, &discovered));
        }

        let content_type = "text/html; charset=utf-8";
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

        Ok(UpstreamResponse {
            status,
            headers,
            body: Bytes::from(html),
            content_type: Some(content_type.to_string()),
            final_url,
        })
    }

    /// Poll until `document.body` exists or the ready timeout passes.
    async fn wait_ready(&self, page: &Page) {
        let poll = async {
            loop {
                let ready = page
                    .evaluate(READY_SCRIPT)
                    .await
                    .ok()
                    .and_then(|r| r.into_value::<bool>().ok())
                    .unwrap_or(false);
                if ready {
                    return;
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(self.ready_timeout, poll).await.is_err() {
            tracing::debug!(
                timeout_ms = self.ready_timeout.as_millis() as u64,
                "Document body not ready before timeout, reading anyway"
            );
        }
    }

    /// Fetch and store each unclaimed asset in the background.
    fn prefetch(&self, urls: Vec<Url>) {
        let claimed: Vec<Url> = urls.into_iter().filter(|u| self.assets.claim(u)).collect();
        if claimed.is_empty() {
            return;
        }
        let direct = Arc::clone(&self.direct);
        let assets = Arc::clone(&self.assets);
        tokio::spawn(async move {
            for url in claimed {
                store_asset(&direct, &assets, &url).await;
            }
        });
    }

    /// Serve an asset-like GET from the cache, filling it on a miss.
    async fn fetch_asset(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        if let Some(hit) = self.assets.load(&request.target).await {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&hit.content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
            return Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers,
                body: hit.body,
                content_type: Some(hit.content_type),
                final_url: request.target.clone(),
            });
        }

        let response = self.direct.fetch(request).await?;
        if response.status.is_success() && self.assets.claim(&request.target) {
            if let Err(e) = self.assets.store(&request.target, &response.body).await {
                tracing::warn!(url = %request.target, error = %e, "Failed to cache asset");
                self.assets.release(&request.target);
            }
        }
        Ok(response)
    }
}

async fn store_asset(direct: &DirectFetcher, assets: &AssetCache, url: &Url) {
    match direct.fetch_bytes(url).await {
        Ok(Some(body)) => {
            if let Err(e) = assets.store(url, &body).await {
                tracing::warn!(url = %url, error = %e, "Failed to cache asset");
                assets.release(url);
            }
        }
        Ok(None) => assets.release(url),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Asset prefetch failed");
            assets.release(url);
        }
    }
}

/// Absolute `http(s)` URLs from `discovered` sharing an origin with `page`.
pub fn same_origin_assets(page: &Url, discovered: &[String]) -> Vec<Url> {
    let origin = page.origin();
    discovered
        .iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .filter(|u| u.origin() == origin)
        .filter(|u| AssetCache::key(u).is_some())
        .collect()
}

#[async_trait]
impl Fetcher for RenderedFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        if request.method != Method::GET {
            return self.direct.fetch(request).await;
        }
        if AssetCache::is_asset_path(&request.target) {
            return self.fetch_asset(request).await;
        }

        let start = Instant::now();
        let result = self.render(&request.target).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_upstream(self.strategy(), outcome, start);
        result
    }

    fn strategy(&self) -> &'static str {
        "rendered"
    }

    async fn shutdown(&self) {
        self.browser.close().await;
    }
}
