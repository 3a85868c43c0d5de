//! Content-type dispatch and body rewriting.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse (body, content-type, final URL)
//!     → ContentKind::detect (content-type, then path extension)
//!     → exactly one of html / css / js / json
//!     → Processed { body, content_type }
//! ```
//!
//! # Design Decisions
//! - A failing rewriter never fails the response: original bytes are passed
//!   through untouched and the failure is logged and counted
//! - Rewritten bodies are always UTF-8 and labelled as such; HTML, CSS and
//!   JS are transcoded from their declared charset first

pub mod charset;
pub mod css;
pub mod html;
pub mod js;
pub mod json;
pub mod shim;

use bytes::Bytes;
use url::Url;

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::resolver::RewriteContext;

/// Which rewriter a response body is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    JavaScript,
    Json,
    Passthrough,
}

impl ContentKind {
    /// Classify by declared content-type, falling back to the URL path
    /// extension when the content-type is absent or generic.
    pub fn detect(content_type: Option<&str>, url: &Url) -> Self {
        let declared = content_type
            .map(|ct| ct.to_ascii_lowercase())
            .unwrap_or_default();
        let essence = declared.split(';').next().unwrap_or("").trim();

        if essence.contains("text/html") || essence == "application/xhtml+xml" {
            return ContentKind::Html;
        }
        if essence.contains("text/css") {
            return ContentKind::Css;
        }
        if essence.contains("javascript") || essence.contains("ecmascript") {
            return ContentKind::JavaScript;
        }
        if essence.contains("application/json") || essence == "text/json" || is_json_suffix(essence) {
            return ContentKind::Json;
        }

        if essence.is_empty() || is_generic(essence) {
            let path = url.path().to_ascii_lowercase();
            if path.ends_with(".css") {
                return ContentKind::Css;
            }
            if path.ends_with(".js") || path.ends_with(".mjs") {
                return ContentKind::JavaScript;
            }
        }

        ContentKind::Passthrough
    }

    /// Content-Type emitted for a successfully rewritten body.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            ContentKind::Html => Some("text/html; charset=utf-8"),
            ContentKind::Css => Some("text/css; charset=utf-8"),
            ContentKind::JavaScript => Some("application/javascript; charset=utf-8"),
            ContentKind::Json => Some("application/json; charset=utf-8"),
            ContentKind::Passthrough => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Css => "css",
            ContentKind::JavaScript => "javascript",
            ContentKind::Json => "json",
            ContentKind::Passthrough => "passthrough",
        }
    }
}

fn is_json_suffix(essence: &str) -> bool {
    essence.starts_with("application/") && essence.ends_with("+json")
}

fn is_generic(essence: &str) -> bool {
    matches!(
        essence,
        "application/octet-stream" | "binary/octet-stream" | "text/plain"
    )
}

/// A body ready to send, with the Content-Type to set.
///
/// `content_type` is `None` when the upstream Content-Type should be kept.
#[derive(Debug, Clone)]
pub struct Processed {
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl Processed {
    fn passthrough(body: Bytes) -> Self {
        Self {
            body,
            content_type: None,
        }
    }
}

/// Run the single rewriter for `kind` over `body`, as served with the
/// upstream `content_type`.
pub fn process(
    body: Bytes,
    kind: ContentKind,
    content_type: Option<&str>,
    ctx: &RewriteContext,
) -> Processed {
    let rewritten = match kind {
        ContentKind::Passthrough => return Processed::passthrough(body),
        ContentKind::Json => match json::normalize(&body) {
            Some(normalized) => Ok(Bytes::from(normalized)),
            None => {
                tracing::debug!(url = %ctx.original(), "Body is not well-formed JSON, passing through");
                return Processed::passthrough(body);
            }
        },
        ContentKind::Html => {
            let text = charset::decode(&body, content_type, true);
            html::rewrite(text.as_bytes(), ctx).map(Bytes::from)
        }
        ContentKind::Css => {
            let text = charset::decode(&body, content_type, false);
            Ok(Bytes::from(css::rewrite(&text, ctx)))
        }
        ContentKind::JavaScript => {
            let text = charset::decode(&body, content_type, false);
            Ok(Bytes::from(js::rewrite(&text, ctx)))
        }
    };

    match rewritten {
        Ok(out) => {
            metrics::record_rewrite(kind.as_str(), true);
            Processed {
                body: out,
                content_type: kind.content_type().map(str::to_string),
            }
        }
        Err(e) => {
            log_failure(kind, ctx, &e);
            metrics::record_rewrite(kind.as_str(), false);
            Processed::passthrough(body)
        }
    }
}

fn log_failure(kind: ContentKind, ctx: &RewriteContext, error: &ProxyError) {
    tracing::warn!(
        kind = kind.as_str(),
        url = %ctx.original(),
        error = %error,
        "Rewrite failed, passing original body through"
    );
}
