//! JSON normalization.
//!
//! JSON bodies are not structurally rewritten; there is no reliable convention
//! for which strings are resource references. Decoding and re-encoding proves
//! well-formedness and strips insignificant whitespace.

use serde_json::Value;

/// Re-serialize `body` compactly, or `None` if it is not valid JSON.
pub fn normalize(body: &[u8]) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    serde_json::to_vec(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_normalized_and_order_kept() {
        let body = b"{\n  \"zeta\": 1,\n  \"alpha\": [true, null, \"x\"]\n}\n";
        let out = normalize(body).unwrap();
        assert_eq!(out, br#"{"zeta":1,"alpha":[true,null,"x"]}"#.to_vec());
    }

    #[test]
    fn test_malformed_is_none() {
        assert_eq!(normalize(b"{\"a\": }"), None);
        assert_eq!(normalize(b""), None);
    }
}
