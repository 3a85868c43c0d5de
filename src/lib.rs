//! Content-rewriting reverse proxy library.
//!
//! Fetches an arbitrary `http(s)` target, rewrites every embedded reference
//! in HTML, CSS and JavaScript so it routes back through the proxy, and
//! serves the result with a permissive header set.

pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resolver;
pub mod rewrite;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use fetch::{Fetcher, ProxyRequest, UpstreamResponse};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resolver::{ProxyBase, RewriteContext};
