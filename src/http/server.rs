//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the proxy and preflight handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Apply the header policy to every response, including those the
//!   middleware and method router produce on their own
//! - Serve on a listener until the shutdown signal fires
//! - Drive one request: validate → fetch → dispatch → rewrite → headers

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    middleware,
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::fetch::Fetcher;
use crate::http::{request, response};
use crate::observability::metrics;
use crate::resolver::RewriteContext;
use crate::rewrite::{self, ContentKind};
use crate::security::headers;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn Fetcher>,
    /// Host used for the proxy base when a request has no `Host` header.
    pub default_host: Arc<str>,
}

/// HTTP server for the rewriting proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and fetcher.
    pub fn new(config: &ProxyConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let state = AppState {
            fetcher,
            default_host: Arc::from(format!("localhost:{}", config.listener.port)),
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let body_limit = config.listener.max_request_body_bytes;
        Router::new()
            .route(
                "/",
                get(proxy_handler)
                    .post(proxy_handler)
                    .put(proxy_handler)
                    .patch(proxy_handler)
                    .delete(proxy_handler)
                    .options(preflight_handler),
            )
            .fallback(not_found_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TimeoutLayer::new(request_deadline(config)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request::request_id(req.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(middleware::map_response(apply_header_policy))
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Outer deadline for one inbound request: fetch plus browser readiness,
/// with headroom so the fetch's own timeout reports first.
fn request_deadline(config: &ProxyConfig) -> Duration {
    Duration::from_secs(config.fetch.timeout_secs)
        + Duration::from_millis(config.rendered.ready_timeout_ms)
        + Duration::from_secs(5)
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();

    let response = match handle(&state, &method, &uri, &headers, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request::request_id(&headers),
                kind = e.kind(),
                error = %e,
                "Proxy request failed"
            );
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn handle(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> ProxyResult<Response> {
    let target = request::target_from_query(uri.query())?;
    let proxy = request::proxy_base(headers, &state.default_host);
    let outbound = request::build_proxy_request(method, target, headers, body);

    tracing::debug!(
        method = %outbound.method,
        url = %outbound.target,
        strategy = state.fetcher.strategy(),
        "Fetching upstream"
    );

    let upstream = state.fetcher.fetch(&outbound).await?;

    if upstream.status.as_u16() >= 400 {
        tracing::debug!(status = upstream.status.as_u16(), "Forwarding upstream error verbatim");
        return Ok(response::passthrough(upstream));
    }

    let kind = ContentKind::detect(upstream.content_type.as_deref(), &upstream.final_url);
    let ctx = RewriteContext::new(upstream.final_url.clone(), proxy);
    let processed = rewrite::process(
        upstream.body.clone(),
        kind,
        upstream.content_type.as_deref(),
        &ctx,
    );

    Ok(response::rewritten(upstream, processed))
}

/// Outermost layer, so 413, 405 and 408 produced below the handlers carry
/// the policy too.
async fn apply_header_policy(mut response: Response) -> Response {
    headers::inject(response.headers_mut());
    response
}

/// CORS preflight: headers only, no fetch.
async fn preflight_handler() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    headers::inject(response.headers_mut());
    response
}

async fn not_found_handler() -> Response {
    response::not_found()
}
