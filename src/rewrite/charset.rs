//! Body decoding ahead of rewriting.
//!
//! Rewriters work on UTF-8 text and their output is labelled UTF-8, so any
//! other declared encoding is transcoded first. Precedence follows browsers:
//! a byte-order mark, then the `charset` parameter of the Content-Type, then
//! (HTML only) a `<meta>` declaration in the first 1024 bytes, then UTF-8.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;

/// How far into an HTML document a `<meta>` charset is looked for.
const META_PRESCAN_BYTES: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_.:-]+)"#)
        .expect("meta charset pattern is valid")
});

/// Decode `body` to UTF-8 text. Undecodable bytes become U+FFFD.
pub fn decode<'b>(body: &'b [u8], content_type: Option<&str>, is_html: bool) -> Cow<'b, str> {
    let encoding = content_type
        .and_then(charset_param)
        .or_else(|| is_html.then(|| meta_charset(body)).flatten())
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!(encoding = used.name(), "Body contained malformed sequences");
    }
    text
}

/// Encoding named by the `charset` parameter of a Content-Type value.
fn charset_param(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'');
        Encoding::for_label(label.as_bytes())
    })
}

fn meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let prefix = &body[..body.len().min(META_PRESCAN_BYTES)];
    let label = META_CHARSET.captures(prefix)?.get(1)?;
    // A meta tag cannot meaningfully declare UTF-16 in an ASCII-readable prefix.
    Encoding::for_label(label.as_bytes()).map(|e| e.output_encoding())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_charset_transcoded() {
        let text = decode(b"caf\xe9", Some("text/css; charset=iso-8859-1"), false);
        assert_eq!(text, "café");

        let quoted = decode(b"caf\xe9", Some("text/html; charset=\"windows-1252\""), true);
        assert_eq!(quoted, "café");
    }

    #[test]
    fn test_shift_jis() {
        // "日本" in Shift_JIS
        let text = decode(b"\x93\xfa\x96\x7b", Some("application/javascript; charset=Shift_JIS"), false);
        assert_eq!(text, "日本");
    }

    #[test]
    fn test_meta_charset_for_html_only() {
        let html = b"<html><head><meta charset=\"iso-8859-1\"></head><body>caf\xe9</body></html>";
        assert!(decode(html, Some("text/html"), true).contains("café"));
        assert!(!decode(html, Some("text/css"), false).contains("café"));

        let http_equiv =
            b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1252\">\x80";
        assert!(decode(http_equiv, None, true).ends_with('€'));
    }

    #[test]
    fn test_header_wins_over_meta() {
        let html = "<meta charset=\"iso-8859-1\"><p>café</p>".as_bytes();
        assert!(decode(html, Some("text/html; charset=utf-8"), true).contains("café"));
    }

    #[test]
    fn test_utf8_default_borrows() {
        let text = decode("plain ✓".as_bytes(), None, false);
        assert!(matches!(text, Cow::Borrowed("plain ✓")));
    }

    #[test]
    fn test_bom_wins() {
        let text = decode(b"\xef\xbb\xbfcaf\xc3\xa9", Some("text/css; charset=iso-8859-1"), false);
        assert_eq!(text, "café");
    }
}
