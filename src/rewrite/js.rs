//! JavaScript reference rewriting.
//!
//! Only plain string literals holding an absolute `http(s)://` or
//! protocol-relative `//host` URL are touched. Template literals, relative
//! paths and anything built at runtime are left for the client shim's
//! `fetch`/`XMLHttpRequest` patches to catch.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::resolver::RewriteContext;

static URL_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""((?:[hH][tT][tT][pP][sS]?:)?//[A-Za-z0-9\[][^"\\\s]*)"|'((?:[hH][tT][tT][pP][sS]?:)?//[A-Za-z0-9\[][^'\\\s]*)'"#,
    )
    .expect("string literal pattern is valid")
});

/// Rewrite absolute URL string literals in `source`.
pub fn rewrite(source: &str, ctx: &RewriteContext) -> String {
    URL_LITERAL
        .replace_all(source, |caps: &Captures<'_>| {
            let (value, quote) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), '"'),
                (None, Some(m)) => (m.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };
            match ctx.rewrite(value) {
                Some(proxied) => format!("{quote}{proxied}{quote}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ProxyBase;
    use url::Url;

    fn ctx() -> RewriteContext {
        RewriteContext::new(
            Url::parse("https://example.com/app/").unwrap(),
            ProxyBase::new("http://localhost:3000"),
        )
    }

    #[test]
    fn test_absolute_literals() {
        let src = r#"fetch("https://api.example.com/v1/items"); load('http://cdn.test/a.js');"#;
        let out = rewrite(src, &ctx());
        assert_eq!(
            out,
            r#"fetch("http://localhost:3000/?url=https%3A%2F%2Fapi.example.com%2Fv1%2Fitems"); load('http://localhost:3000/?url=http%3A%2F%2Fcdn.test%2Fa.js');"#
        );
    }

    #[test]
    fn test_protocol_relative_uses_page_scheme() {
        let out = rewrite("var s = '//cdn.example.org/lib.js';", &ctx());
        assert_eq!(
            out,
            "var s = 'http://localhost:3000/?url=https%3A%2F%2Fcdn.example.org%2Flib.js';"
        );
    }

    #[test]
    fn test_relative_and_templates_untouched() {
        let src = "fetch('/api/items'); fetch(`https://example.com/${id}`); x = a // comment";
        assert_eq!(rewrite(src, &ctx()), src);
    }

    #[test]
    fn test_inert_values_untouched() {
        let src = r##"a = "data:text/plain,hi"; b = 'blob:https://example.com/1'; c = "#top";"##;
        assert_eq!(rewrite(src, &ctx()), src);
    }

    #[test]
    fn test_bare_double_slash_untouched() {
        let src = r#"parts = url.split("//"); re = '//'"#;
        assert_eq!(rewrite(src, &ctx()), src);
    }

    #[test]
    fn test_idempotent() {
        let once = rewrite(r#"x = "https://example.com/a.json";"#, &ctx());
        assert_eq!(rewrite(&once, &ctx()), once);
    }
}
