//! HTTP-level tests: the full service behind the router, talked to over a
//! real socket, with stub engine processes standing in for the browser.

mod common;

use std::sync::Arc;

use pageshot::ScreenshotService;

use common::StubEngine;

async fn serve(service: Arc<ScreenshotService>) -> String {
    let app = pageshot::router(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_endpoint_responds() {
    let stub = StubEngine::healthy();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/health")).await.expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "OK");

    // The probe must not touch the engine.
    assert_eq!(stub.launches(), 0);
}

#[tokio::test]
async fn capture_returns_jpeg_with_cache_headers() {
    let stub = StubEngine::healthy();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!(
        "{base}/?url=https://example.com&width=800&height=600"
    ))
    .await
    .expect("request");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert_eq!(resp.headers()["cache-control"], "public, max-age=3600");
    assert_eq!(resp.bytes().await.expect("body").as_ref(), common::JPEG_BYTES);
}

#[tokio::test]
async fn missing_url_parameter_is_a_bad_request() {
    let stub = StubEngine::healthy();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/")).await.expect("request");
    assert_eq!(resp.status(), 400);
    assert_eq!(stub.launches(), 0);
}

#[tokio::test]
async fn unsupported_scheme_yields_json_error_body() {
    let stub = StubEngine::healthy();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/?url=ftp://example.com"))
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json body");
    assert_eq!(body["statusCode"], 400);
    assert!(
        body["message"].as_str().expect("message").contains("scheme"),
        "unexpected message: {body}"
    );
    assert!(body["timestamp"].is_string());
    assert_eq!(stub.launches(), 0);
}

#[tokio::test]
async fn navigation_timeout_maps_to_gateway_timeout() {
    let stub = StubEngine::nav_timeout();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/?url=https://slow.example.com"))
        .await
        .expect("request");
    assert_eq!(resp.status(), 504);

    let body: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json body");
    assert_eq!(body["statusCode"], 504);
}

#[tokio::test]
async fn launch_failure_maps_to_service_unavailable() {
    let stub = StubEngine::failing_launch();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/?url=https://example.com"))
        .await
        .expect("request");
    assert_eq!(resp.status(), 503);

    let body: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json body");
    assert_eq!(body["statusCode"], 503);
}

#[tokio::test]
async fn legacy_idletime_parameter_is_accepted() {
    let stub = StubEngine::healthy();
    let base = serve(ScreenshotService::new(stub.service_config())).await;

    let resp = reqwest::get(format!("{base}/?url=https://example.com&idletime=50"))
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
}
