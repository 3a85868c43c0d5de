//! Outbound response assembly.
//!
//! # Responsibilities
//! - Turn an upstream response (rewritten or not) into the client response
//! - Map `ProxyError` to status codes and the JSON error body
//! - Run the header policy on every path
//!
//! # Design Decisions
//! - Upstream errors (status >= 400) are forwarded verbatim: same status,
//!   body and content-type
//! - Fetch failures surface as 500 with `details`; invalid targets as 400
//!   without

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ProxyError;
use crate::fetch::UpstreamResponse;
use crate::rewrite::Processed;
use crate::security::headers;

pub const INVALID_URL_MESSAGE: &str = "Invalid URL.";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch the requested URL.";

/// JSON body of every error the proxy itself produces.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            details,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ProxyError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, ErrorBody::new(INVALID_URL_MESSAGE, None)),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(FETCH_FAILED_MESSAGE, Some(other.to_string())),
            ),
        };
        let mut response = (status, Json(body)).into_response();
        headers::inject(response.headers_mut());
        response
    }
}

/// Forward an upstream response untouched apart from the header policy.
pub fn passthrough(upstream: UpstreamResponse) -> Response {
    build(upstream.status, &upstream.headers, upstream.body, None)
}

/// Send a processed body with the upstream status and headers.
pub fn rewritten(upstream: UpstreamResponse, processed: Processed) -> Response {
    build(
        upstream.status,
        &upstream.headers,
        processed.body,
        processed.content_type.as_deref(),
    )
}

/// `404` for paths the proxy does not serve.
pub fn not_found() -> Response {
    let mut response = (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("Not found.", None)),
    )
        .into_response();
    headers::inject(response.headers_mut());
    response
}

fn build(
    status: StatusCode,
    upstream_headers: &axum::http::HeaderMap,
    body: bytes::Bytes,
    content_type: Option<&str>,
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let response_headers = response.headers_mut();
    *response_headers = headers::sanitize(upstream_headers);
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        response_headers.insert(CONTENT_TYPE, value);
    }
    headers::inject(response_headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use bytes::Bytes;
    use url::Url;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn upstream(status: u16, content_type: &'static str, body: &'static [u8]) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        UpstreamResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from_static(body),
            content_type: Some(content_type.to_string()),
            final_url: Url::parse("https://example.com/").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_invalid_url_body() {
        let response = ProxyError::InvalidUrl("ftp://x".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"status":"error","message":"Invalid URL."}"#);
    }

    #[tokio::test]
    async fn test_fetch_failure_has_details() {
        let response = ProxyError::UpstreamTimeout {
            url: "https://slow.example/".into(),
            secs: 30,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], FETCH_FAILED_MESSAGE);
        assert!(json["details"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_passthrough_keeps_status_and_body() {
        let response = passthrough(upstream(404, "text/plain", b"nope"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert!(response.headers().get("x-frame-options").is_none());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"nope");
    }

    #[test]
    fn test_rewritten_sets_content_type() {
        let processed = Processed {
            body: Bytes::from_static(b"{}"),
            content_type: Some("application/json; charset=utf-8".into()),
        };
        let response = rewritten(upstream(200, "application/json", b"{ }"), processed);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
    }
}
