//! HTML document rewriting.
//!
//! # Responsibilities
//! - Insert `<base href="{origin}">` when the document has none
//! - Route resource-bearing attributes through the proxy
//! - Rewrite `srcset`, inline `style` attributes and `<style>` blocks
//! - Rewrite absolute URL literals in inline scripts
//! - Inject the client runtime shim at the end of `<head>`
//!
//! # Design Decisions
//! - Streaming rewrite with `lol_html`; a cheap pre-scan decides where the
//!   `<base>` and shim go so the main pass never needs to look ahead
//! - Output is a pure function of `(html, original URL, proxy base)`

use std::borrow::Cow;
use std::cell::Cell;

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, HtmlRewriter, Settings};

use crate::error::ProxyError;
use crate::resolver::RewriteContext;
use crate::rewrite::{css, js, shim};

/// Elements and the single URL-bearing attribute rewritten on each.
pub const URL_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("script", "src"),
    ("img", "src"),
    ("iframe", "src"),
    ("source", "src"),
    ("video", "poster"),
    ("form", "action"),
];

/// Facts about the document gathered before rewriting.
#[derive(Debug, Default, Clone, Copy)]
struct DocumentShape {
    has_base: bool,
    has_head: bool,
    head_closed: bool,
    has_html: bool,
}

/// Rewrite an HTML document for delivery through the proxy.
pub fn rewrite(html: &[u8], ctx: &RewriteContext) -> Result<Vec<u8>, ProxyError> {
    let shape = scan(html)?;

    let base_tag = if shape.has_base {
        String::new()
    } else {
        format!("<base href=\"{}\">", ctx.original_origin())
    };
    let shim_tag = shim::script_tag(ctx.proxy());

    let mut output = Vec::with_capacity(html.len() + shim_tag.len() + base_tag.len());
    let head_injected = Cell::new(false);
    let inline_script_is_js = Cell::new(false);
    let mut style_buffer = String::new();
    let mut script_buffer = String::new();

    let mut handlers = Vec::new();

    if shape.has_head {
        handlers.push(element!("head", |el| {
            if head_injected.replace(true) {
                return Ok(());
            }
            if shape.head_closed {
                if !base_tag.is_empty() {
                    el.prepend(&base_tag, ContentType::Html);
                }
                el.append(&shim_tag, ContentType::Html);
            } else {
                el.prepend(&format!("{base_tag}{shim_tag}"), ContentType::Html);
            }
            Ok(())
        }));
    } else if shape.has_html {
        handlers.push(element!("html", |el| {
            if !head_injected.replace(true) {
                el.prepend(&format!("<head>{base_tag}{shim_tag}</head>"), ContentType::Html);
            }
            Ok(())
        }));
    }

    for &(tag, attr) in URL_ATTRIBUTES {
        handlers.push(element!(format!("{tag}[{attr}]"), move |el| {
            rewrite_url_attribute(el, attr, ctx);
            Ok(())
        }));
    }

    handlers.push(element!("img[srcset], source[srcset]", |el| {
        if let Some(value) = el.get_attribute("srcset") {
            let rewritten = rewrite_srcset(&decode_entities(&value), ctx);
            set_attribute(el, "srcset", &rewritten);
        }
        Ok(())
    }));

    handlers.push(element!("[style]", |el| {
        if let Some(value) = el.get_attribute("style") {
            let decoded = decode_entities(&value);
            if let Cow::Owned(rewritten) = css::rewrite_if_needed(&decoded, ctx) {
                set_attribute(el, "style", &rewritten.replace('&', "&amp;"));
            }
        }
        Ok(())
    }));

    handlers.push(element!("script", |el| {
        let is_js = el.get_attribute("src").is_none()
            && is_javascript_type(el.get_attribute("type").as_deref());
        inline_script_is_js.set(is_js);
        Ok(())
    }));

    handlers.push(text!("style", |chunk| {
        style_buffer.push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let rewritten = css::rewrite_if_needed(&style_buffer, ctx).into_owned();
            chunk.replace(&rewritten, ContentType::Html);
            style_buffer.clear();
        } else {
            chunk.remove();
        }
        Ok(())
    }));

    handlers.push(text!("script", |chunk| {
        if !inline_script_is_js.get() {
            return Ok(());
        }
        script_buffer.push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let rewritten = js::rewrite(&script_buffer, ctx);
            chunk.replace(&rewritten, ContentType::Html);
            script_buffer.clear();
        } else {
            chunk.remove();
        }
        Ok(())
    }));

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );
    rewriter
        .write(html)
        .map_err(|e| ProxyError::Rewrite(e.to_string()))?;
    rewriter.end().map_err(|e| ProxyError::Rewrite(e.to_string()))?;

    if !shape.has_head && !shape.has_html {
        let mut prefixed = format!("{base_tag}{shim_tag}").into_bytes();
        prefixed.extend_from_slice(&output);
        output = prefixed;
    }

    Ok(output)
}

/// Pre-scan for `<base>`, `<head>` and `<html>`.
fn scan(html: &[u8]) -> Result<DocumentShape, ProxyError> {
    let has_base = Cell::new(false);
    let has_head = Cell::new(false);
    let has_html = Cell::new(false);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("base[href]", |_| {
                    has_base.set(true);
                    Ok(())
                }),
                element!("head", |_| {
                    has_head.set(true);
                    Ok(())
                }),
                element!("html", |_| {
                    has_html.set(true);
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter
        .write(html)
        .map_err(|e| ProxyError::Rewrite(e.to_string()))?;
    rewriter.end().map_err(|e| ProxyError::Rewrite(e.to_string()))?;

    Ok(DocumentShape {
        has_base: has_base.get(),
        has_head: has_head.get(),
        head_closed: contains_ignore_case(html, b"</head"),
        has_html: has_html.get(),
    })
}

fn rewrite_url_attribute(el: &mut Element<'_, '_>, attr: &str, ctx: &RewriteContext) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    let value = decode_entities(&value);
    if let Some(proxied) = ctx.rewrite(&value) {
        set_attribute(el, attr, &proxied);
    }
}

fn set_attribute(el: &mut Element<'_, '_>, attr: &str, value: &str) {
    if let Err(e) = el.set_attribute(attr, value) {
        tracing::debug!(attribute = attr, error = %e, "Failed to set rewritten attribute");
    }
}

/// Rewrite each candidate of a `srcset`, keeping width/density descriptors.
///
/// Candidate lists containing `data:` URIs are left alone: their commas make
/// the list ambiguous without a real parser.
pub fn rewrite_srcset(value: &str, ctx: &RewriteContext) -> String {
    if value.to_ascii_lowercase().contains("data:") {
        return value.to_string();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| {
            let (url, descriptor) = match candidate.split_once(char::is_whitespace) {
                Some((url, descriptor)) => (url, descriptor.trim()),
                None => (candidate, ""),
            };
            let url = ctx.rewrite(url).unwrap_or_else(|| url.to_string());
            if descriptor.is_empty() {
                url
            } else {
                format!("{url} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_javascript_type(script_type: Option<&str>) -> bool {
    match script_type.map(|t| t.trim().to_ascii_lowercase()) {
        None => true,
        Some(t) => t.is_empty() || t == "module" || t.contains("javascript") || t.contains("ecmascript"),
    }
}

/// Decode the handful of entities that show up in URL-bearing attributes.
fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&quot;", "\"")
            .replace("&#34;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&apos;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
