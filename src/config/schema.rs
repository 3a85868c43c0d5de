//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Default outbound User-Agent, used when the caller does not send one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host, port, inbound limits).
    pub listener: ListenerConfig,

    /// Outbound fetch policy.
    pub fetch: FetchConfig,

    /// Headless browser settings for the rendered strategy.
    pub rendered: RenderedConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port. Overridden by the `PORT` environment variable.
    pub port: u16,

    /// Maximum inbound request body forwarded upstream.
    pub max_request_body_bytes: usize,
}

impl ListenerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Which transport retrieves upstream content.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP client.
    #[default]
    Direct,
    /// Headless browser navigation.
    Rendered,
}

impl std::str::FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(FetchStrategy::Direct),
            "rendered" => Ok(FetchStrategy::Rendered),
            other => Err(format!("unknown fetch strategy '{}' (expected direct or rendered)", other)),
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Direct => write!(f, "direct"),
            FetchStrategy::Rendered => write!(f, "rendered"),
        }
    }
}

/// Outbound fetch policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Transport used for every proxied request.
    pub strategy: FetchStrategy,

    /// User-Agent sent when the caller provides none.
    pub user_agent: String,

    /// Upstream body ceiling in bytes.
    pub max_response_bytes: u64,

    /// Total request deadline in seconds.
    pub timeout_secs: u64,

    /// Maximum redirects followed before failing.
    pub max_redirects: usize,

    /// Skip certificate validation on the outbound leg.
    pub accept_invalid_certs: bool,

    /// How long idle keep-alive connections stay pooled.
    pub pool_idle_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::Direct,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_response_bytes: 100 * 1024 * 1024, // 100MB
            timeout_secs: 30,
            max_redirects: 5,
            accept_invalid_certs: true,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Headless browser configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderedConfig {
    /// Explicit Chrome/Chromium binary. Auto-detected when unset.
    pub chrome_executable: Option<String>,

    /// Upper bound on waiting for `document.body` after navigation.
    pub ready_timeout_ms: u64,

    /// Directory holding prefetched same-origin assets.
    pub asset_cache_dir: String,

    /// Prefetch same-origin assets discovered on rendered pages.
    pub prefetch_assets: bool,

    /// Additional command-line switches for the browser.
    pub extra_args: Vec<String>,
}

impl Default for RenderedConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            ready_timeout_ms: 10_000,
            asset_cache_dir: "public/assets".to_string(),
            prefetch_assets: true,
            extra_args: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
