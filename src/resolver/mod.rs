//! URL validation and resolution.
//!
//! # Responsibilities
//! - Accept only `http`/`https` targets
//! - Resolve relative references against the page they were found on
//! - Recognize references that already point back through the proxy
//!
//! # Design Decisions
//! - Resolution is infallible from the caller's view: `None` means "leave the
//!   original text alone", never an error
//! - A proxied-of-a-proxied URL is flattened to its innermost target in one
//!   bounded loop, so wrapping depth can never grow

pub mod context;

use url::Url;

pub use context::{ProxyBase, RewriteContext};

/// Query marker identifying an already-proxied reference.
pub const PROXIED_MARKER: &str = "?url=";

/// Nesting depth beyond which an inner target is no longer unwrapped.
const MAX_UNWRAP_DEPTH: usize = 8;

/// True when `raw` parses as an absolute `http` or `https` URL.
pub fn validate(raw: &str) -> bool {
    parse_target(raw).is_some()
}

/// Parse `raw` as an absolute `http`/`https` URL.
pub fn parse_target(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Resolve `candidate` as found on the page at `base`.
///
/// Empty candidates resolve to `base`. Already-proxied candidates yield their
/// inner target. Absolute `http(s)` candidates are returned as-is; anything
/// else goes through standard relative resolution.
pub fn resolve(base: &Url, candidate: &str) -> Option<Url> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Some(base.clone());
    }
    if let Some(inner) = extract_proxied(candidate) {
        return Some(inner);
    }
    if is_absolute_http(candidate) {
        return Url::parse(candidate).ok();
    }
    base.join(candidate).ok()
}

/// Extract the real target from a reference of the form `...?url=<encoded>`.
///
/// Nested wrappers are peeled until the innermost target is reached.
pub fn extract_proxied(raw: &str) -> Option<Url> {
    let mut current = inner_target(raw)?;
    for _ in 0..MAX_UNWRAP_DEPTH {
        match inner_target(current.as_str()) {
            Some(next) => current = next,
            None => break,
        }
    }
    Some(current)
}

/// One unwrapping step: decode the `url` parameter following the marker.
fn inner_target(raw: &str) -> Option<Url> {
    let start = raw.find(PROXIED_MARKER)? + PROXIED_MARKER.len();
    let encoded = &raw[start..];
    let encoded = encoded.split('&').next().unwrap_or(encoded);
    let encoded = encoded.split('#').next().unwrap_or(encoded);
    let unplussed = encoded.replace('+', " ");
    let decoded = percent_encoding::percent_decode_str(&unplussed)
        .decode_utf8()
        .ok()?;
    parse_target(&decoded)
}

fn is_absolute_http(candidate: &str) -> bool {
    let lower = candidate.get(..8).unwrap_or(candidate).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// References that are never rewritten: inline data, blobs, and fragments.
pub fn is_inert(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    let lower = trimmed.get(..5).unwrap_or(trimmed).to_ascii_lowercase();
    trimmed.starts_with('#') || lower.starts_with("data:") || lower.starts_with("blob:")
}
