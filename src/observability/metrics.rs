//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, upstream outcomes, rewrites)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `proxy_requests_total` (counter): inbound requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_upstream_fetches_total` (counter): fetches by strategy, outcome
//! - `proxy_upstream_fetch_duration_seconds` (histogram): fetch latency
//! - `proxy_rewrites_total` (counter): rewrites by kind, result
//! - `proxy_asset_cache_total` (counter): asset cache hits and misses
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so unit tests and
//!   the default configuration pay nothing
//! - Label values are small closed sets; never the target URL

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one inbound request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record one upstream fetch. `outcome` is `ok` or a `ProxyError::kind`.
pub fn record_upstream(strategy: &'static str, outcome: &'static str, start: Instant) {
    counter!(
        "proxy_upstream_fetches_total",
        "strategy" => strategy,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("proxy_upstream_fetch_duration_seconds", "strategy" => strategy)
        .record(start.elapsed().as_secs_f64());
}

/// Record a rewriter run.
pub fn record_rewrite(kind: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "fallback" };
    counter!("proxy_rewrites_total", "kind" => kind, "result" => result).increment(1);
}

/// Record an asset cache lookup.
pub fn record_asset_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("proxy_asset_cache_total", "result" => result).increment(1);
}
