//! Proxy origin and per-response rewrite context.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use super::{is_inert, resolve};

/// Characters escaped in the `url` query parameter.
///
/// `encodeURIComponent`'s set, plus `'`, `(` and `)` so a wrapped URL can sit
/// inside quoted attributes, unquoted CSS `url()` and JS string literals alike.
const TARGET_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*');

/// Scheme and host at which the proxy is reachable for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase {
    origin: String,
}

impl ProxyBase {
    /// Build from an explicit origin such as `http://localhost:3000`.
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    /// Derive from the inbound `Host` header and optional `X-Forwarded-Proto`.
    pub fn from_host(host: &str, forwarded_proto: Option<&str>) -> Self {
        let scheme = forwarded_proto
            .and_then(|p| p.split(',').next())
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| p == "http" || p == "https")
            .unwrap_or_else(|| "http".to_string());
        Self::new(format!("{}://{}", scheme, host.trim()))
    }

    /// The origin, without trailing slash.
    pub fn as_str(&self) -> &str {
        &self.origin
    }

    /// `{origin}/?url={encoded target}`.
    pub fn wrap(&self, target: &Url) -> String {
        format!(
            "{}/?url={}",
            self.origin,
            utf8_percent_encode(target.as_str(), TARGET_ENCODE_SET)
        )
    }
}

impl std::fmt::Display for ProxyBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.origin)
    }
}

/// The `(originalUrl, proxyBase)` pair threaded through every rewriter.
///
/// References are always resolved against `original`, never against the
/// proxy's own URL.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    original: Url,
    proxy: ProxyBase,
}

impl RewriteContext {
    pub fn new(original: Url, proxy: ProxyBase) -> Self {
        Self { original, proxy }
    }

    pub fn original(&self) -> &Url {
        &self.original
    }

    pub fn proxy(&self) -> &ProxyBase {
        &self.proxy
    }

    /// Scheme and host of the original URL, e.g. `https://example.com`.
    pub fn original_origin(&self) -> String {
        self.original.origin().ascii_serialization()
    }

    /// Rewrite one raw reference into its proxied form.
    ///
    /// Returns `None` when the reference must be left untouched: inert
    /// (`data:`, `blob:`, `#...`), unresolvable, or not `http(s)` after
    /// resolution (`javascript:`, `mailto:` and friends).
    pub fn rewrite(&self, raw: &str) -> Option<String> {
        if raw.trim().is_empty() || is_inert(raw) {
            return None;
        }
        let target = resolve(&self.original, raw)?;
        if !matches!(target.scheme(), "http" | "https") {
            return None;
        }
        Some(self.proxy.wrap(&target))
    }
}
