//! CSS reference rewriting.
//!
//! Pattern-based over raw text, shared by standalone stylesheets, `<style>`
//! blocks and `style="..."` attributes. Handles `url(...)` in all three quoting
//! styles and the string form of `@import`.
//!
//! Known blind spots: `url(` inside comments is rewritten like any other
//! occurrence, escaped quotes inside a quoted URL end the match early, and
//! `url` split by comments or odd whitespace is missed.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::resolver::RewriteContext;

static URL_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]*))\s*\)"#)
        .expect("url() pattern is valid")
});

static IMPORT_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#)
        .expect("@import pattern is valid")
});

/// Rewrite every `url(...)` and `@import "..."` reference in `css`.
pub fn rewrite(css: &str, ctx: &RewriteContext) -> String {
    let imported = IMPORT_STRING.replace_all(css, |caps: &Captures<'_>| {
        let (value, quote) = quoted_value(caps);
        match ctx.rewrite(value) {
            Some(proxied) => format!("@import {quote}{proxied}{quote}"),
            None => caps[0].to_string(),
        }
    });

    URL_FUNCTION
        .replace_all(&imported, |caps: &Captures<'_>| {
            let (value, quote) = quoted_value(caps);
            match ctx.rewrite(value) {
                Some(proxied) => format!("url({quote}{proxied}{quote})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite only if the text can contain a reference at all.
pub fn rewrite_if_needed<'a>(css: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
    let lower = css.to_ascii_lowercase();
    if lower.contains("url(") || lower.contains("@import") {
        Cow::Owned(rewrite(css, ctx))
    } else {
        Cow::Borrowed(css)
    }
}

/// The captured value and the quote character that surrounded it.
fn quoted_value<'c>(caps: &'c Captures<'_>) -> (&'c str, &'static str) {
    if let Some(m) = caps.get(1) {
        (m.as_str(), "\"")
    } else if let Some(m) = caps.get(2) {
        (m.as_str(), "'")
    } else {
        (caps.get(3).map_or("", |m| m.as_str()), "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ProxyBase;
    use url::Url;

    fn ctx(base: &str) -> RewriteContext {
        RewriteContext::new(Url::parse(base).unwrap(), ProxyBase::new("http://localhost:3000"))
    }

    #[test]
    fn test_import_and_background() {
        let css = "@import url(\"fonts.css\");\nbody { background:url(../img/bg.png) }";
        let out = rewrite(css, &ctx("https://example.com/style/"));

        assert!(out.contains(
            "@import url(\"http://localhost:3000/?url=https%3A%2F%2Fexample.com%2Fstyle%2Ffonts.css\");"
        ));
        assert!(out.contains(
            "background:url(http://localhost:3000/?url=https%3A%2F%2Fexample.com%2Fimg%2Fbg.png)"
        ));
    }

    #[test]
    fn test_import_string_keeps_quotes() {
        let out = rewrite("@import 'theme.css';", &ctx("https://example.com/"));
        assert_eq!(
            out,
            "@import 'http://localhost:3000/?url=https%3A%2F%2Fexample.com%2Ftheme.css';"
        );
    }

    #[test]
    fn test_single_quoted_url() {
        let out = rewrite(".a{background:url( '/x.svg' )}", &ctx("https://example.com/"));
        assert_eq!(
            out,
            ".a{background:url('http://localhost:3000/?url=https%3A%2F%2Fexample.com%2Fx.svg')}"
        );
    }

    #[test]
    fn test_data_urls_untouched() {
        let css = ".i{background:url(data:image/png;base64,iVBORw0KGgo=)}";
        assert_eq!(rewrite(css, &ctx("https://example.com/")), css);

        let quoted = ".i{mask:url(\"data:image/svg+xml;utf8,<svg></svg>\")}";
        assert_eq!(rewrite(quoted, &ctx("https://example.com/")), quoted);
    }

    #[test]
    fn test_fragment_reference_untouched() {
        let css = ".f{filter:url(#blur)}";
        assert_eq!(rewrite(css, &ctx("https://example.com/")), css);
    }

    #[test]
    fn test_already_proxied_is_stable() {
        let once = rewrite("a{b:url(/x.png)}", &ctx("https://example.com/"));
        let twice = rewrite(&once, &ctx("https://example.com/"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rewrite_if_needed_borrows() {
        let css = "body { color: red }";
        assert!(matches!(rewrite_if_needed(css, &ctx("https://example.com/")), Cow::Borrowed(_)));
    }
}
