//! Failure injection tests: upstream faults surface as JSON 500s.

use std::time::Duration;

use axum::http::StatusCode;
use rewrite_proxy::config::ProxyConfig;
use tokio::net::TcpListener;

mod common;
use common::MockResponse;

async fn error_json(res: reqwest::Response) -> serde_json::Value {
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let body = res.text().await.unwrap();
    serde_json::from_str(&body).expect("error body is JSON")
}

#[tokio::test]
async fn test_unreachable_upstream() {
    // Bind and drop to get a port nothing listens on.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let res = common::client()
        .get(proxy.url(&format!("http://{}/", dead)))
        .send()
        .await
        .unwrap();

    let json = error_json(res).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "Failed to fetch the requested URL.");
    assert!(json["details"].as_str().is_some_and(|d| !d.is_empty()));
}

#[tokio::test]
async fn test_upstream_timeout() {
    let backend = common::start_mock_backend(
        MockResponse::new(200, "text/plain", "late").delayed(Duration::from_secs(3)),
    )
    .await;
    let mut config = ProxyConfig::default();
    config.fetch.timeout_secs = 1;
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(proxy.url(&format!("http://{}/slow", backend)))
        .send()
        .await
        .unwrap();

    let json = error_json(res).await;
    assert!(json["details"].as_str().unwrap().contains("timed out"), "{json}");
}

#[tokio::test]
async fn test_oversized_response() {
    let backend =
        common::start_mock_backend(MockResponse::new(200, "text/plain", vec![b'x'; 1024])).await;
    let mut config = ProxyConfig::default();
    config.fetch.max_response_bytes = 16;
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(proxy.url(&format!("http://{}/big", backend)))
        .send()
        .await
        .unwrap();

    let json = error_json(res).await;
    assert!(json["details"].as_str().unwrap().contains("exceeds"), "{json}");
}

#[tokio::test]
async fn test_redirect_loop() {
    let backend = common::start_mock_backend(MockResponse::redirect("/loop")).await;
    let mut config = ProxyConfig::default();
    config.fetch.max_redirects = 2;
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(proxy.url(&format!("http://{}/loop", backend)))
        .send()
        .await
        .unwrap();

    let json = error_json(res).await;
    assert!(json["details"].as_str().unwrap().contains("Too many redirects"), "{json}");
}

#[tokio::test]
async fn test_proxy_survives_failures() {
    let backend = common::start_mock_backend(MockResponse::new(200, "text/plain", "fine")).await;
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = common::client();

    for _ in 0..3 {
        let res = client
            .get(proxy.url(&format!("http://{}/", dead)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let res = client
        .get(proxy.url(&format!("http://{}/", backend)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "fine");
}
