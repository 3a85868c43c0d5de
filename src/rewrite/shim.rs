//! Client runtime shim.
//!
//! The shim is injected into every rewritten HTML document and keeps the page
//! pointed at the proxy after load: History API, `fetch`,
//! `XMLHttpRequest.open`, `location.assign/replace`, CSP `<meta>` removal and
//! dynamically inserted `<script>` elements. Its only parameter is the proxy
//! base, so the output is deterministic per proxy origin.
//!
//! Known blind spot: `Location` members are unforgeable in browsers, so the
//! `location.assign`/`replace` patch is rejected and those navigations
//! leave the proxy unless the target was already wrapped in the markup.

use crate::resolver::ProxyBase;

const TEMPLATE: &str = include_str!("shim.js");
const PLACEHOLDER: &str = "__PROXY_BASE__";

/// Render the shim source for `proxy`.
pub fn render(proxy: &ProxyBase) -> String {
    let literal = serde_json::to_string(proxy.as_str())
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/");
    TEMPLATE.replace(PLACEHOLDER, &literal)
}

/// The shim wrapped in a `<script>` element ready for insertion.
pub fn script_tag(proxy: &ProxyBase) -> String {
    format!("<script data-rewrite-proxy=\"shim\">{}</script>", render(proxy))
}
