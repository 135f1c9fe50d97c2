//! HTTP routing tests, driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{source_server, Fixture, ScriptedTools};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use usdz2glb::server::{router, AppState};
use usdz2glb::{ConverterConfig, InMemoryObjectStore};

const BOUNDARY: &str = "usdz2glb-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

fn app(fx: &Fixture) -> axum::Router {
    router(AppState::new(fx.service.clone()))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// `GET /api/model` with `target` as the percent-encoded `url` parameter.
fn model_request(target: &str) -> Request<Body> {
    let mut url = reqwest::Url::parse("http://localhost/api/model").unwrap();
    url.query_pairs_mut().append_pair("url", target);
    Request::builder()
        .uri(format!("{}?{}", url.path(), url.query().unwrap()))
        .body(Body::empty())
        .unwrap()
}

fn json_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

/// Build a multipart body with a single part.
fn multipart_request(field: &str, filename: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/convert/usdz-to-glb")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(
        app(&fx),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
    assert!(fx.tools.calls().is_empty());
}

// ── POST /convert ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_success() {
    let source = source_server(&[("model.usdz", &b"PK\x03\x04"[..])]).await;
    let fx = Fixture::new(ScriptedTools::ok());

    let payload = json!({
        "inputUrl": source.url("model.usdz?sig=abc"),
        "outputBucket": "out-bucket",
        "outputPath": "models/model.glb",
    });
    let (status, body) = send(app(&fx), json_request(payload.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Conversion successful", "outputPath": "models/model.glb" })
    );
    assert_eq!(fx.store.len(), 1);
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_convert_empty_body() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(app(&fx), json_request(Body::empty())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No JSON data received");
    assert_eq!(body["stage"], "validation");
}

#[tokio::test]
async fn test_convert_missing_fields() {
    let fx = Fixture::new(ScriptedTools::ok());
    let payload = json!({ "inputUrl": "https://x/model.usdz", "outputPath": "m.glb" });
    let (status, body) = send(app(&fx), json_request(payload.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["missing"], json!(["outputBucket"]));
    assert!(fx.tools.calls().is_empty());
}

#[tokio::test]
async fn test_convert_tool_failure_is_500() {
    let source = source_server(&[("model.usdz", &b"PK\x03\x04"[..])]).await;
    let fx = Fixture::new(ScriptedTools::failing("usdcat", 1));

    let payload = json!({
        "inputUrl": source.url("model.usdz"),
        "outputBucket": "out-bucket",
        "outputPath": "models/model.glb",
    });
    let (status, body) = send(app(&fx), json_request(payload.to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["stage"], "conversion-step-1");
    assert!(body["error"].as_str().unwrap().contains("usdcat"));
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_convert_backslash_destination_is_400() {
    let source = source_server(&[("model.usdz", &b"PK\x03\x04"[..])]).await;
    let fx = Fixture::new(ScriptedTools::ok());

    let payload = json!({
        "inputUrl": source.url("model.usdz"),
        "outputBucket": "out-bucket",
        "outputPath": "models\\model.glb",
    });
    let (status, body) = send(app(&fx), json_request(payload.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["stage"], "validation");
    assert!(source.queries.lock().unwrap().is_empty());
    assert!(fx.tools.calls().is_empty());
    assert_eq!(fx.leftover_workspaces(), 0);
}

// ── POST /api/convert/usdz-to-glb ────────────────────────────────────────────

#[tokio::test]
async fn test_upload_success() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(
        app(&fx),
        multipart_request("file", "chair.usdz", b"PK\x03\x04"),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let url = body["output_url"].as_str().unwrap();
    assert!(url.starts_with("memory://uploads/converted/"), "{url}");
    assert!(url.ends_with("/chair.glb"), "{url}");

    let keys = fx.store.keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].0, "uploads");
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_upload_wrong_extension() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(app(&fx), multipart_request("file", "asset.txt", b"hello")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid file format");
    assert!(fx.tools.calls().is_empty());
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(
        app(&fx),
        multipart_request("attachment", "chair.usdz", b"PK"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_without_bucket_is_500() {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = ConverterConfig::builder()
        .workspace_root(workspace_root.path())
        .build()
        .unwrap();
    let fx = Fixture::build(
        config,
        ScriptedTools::ok(),
        Arc::new(InMemoryObjectStore::new()),
        workspace_root,
    );

    let (status, body) = send(app(&fx), multipart_request("file", "chair.usdz", b"PK")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("upload bucket"));
    assert!(fx.tools.calls().is_empty());
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = ConverterConfig::builder()
        .workspace_root(workspace_root.path())
        .upload_bucket("uploads")
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    let fx = Fixture::build(
        config,
        ScriptedTools::ok(),
        Arc::new(InMemoryObjectStore::new()),
        workspace_root,
    );

    let big = vec![0u8; 4096];
    let (status, _) = send(app(&fx), multipart_request("file", "chair.usdz", &big)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(fx.tools.calls().is_empty());
}

#[tokio::test]
async fn test_upload_panic_is_generic_500_and_cleans_up() {
    let fx = Fixture::new(ScriptedTools::panicking("usd2gltf"));
    let (status, body) = send(app(&fx), multipart_request("file", "chair.usdz", b"PK")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal error: conversion task failed");
    assert!(!body.to_string().contains("blew up"), "{body}");
    assert_eq!(fx.tools.programs(), vec!["usdcat", "usd2gltf"]);
    assert!(fx.store.is_empty());
    assert_eq!(fx.leftover_workspaces(), 0);
}

// ── GET /api/model ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_model_proxy_streams_upstream() {
    let source = source_server(&[("chair.glb", &b"glTF\x02\x00\x00\x00"[..])]).await;
    let fx = Fixture::new(ScriptedTools::ok());

    let response = app(&fx)
        .oneshot(model_request(&source.url("chair.glb?sig=abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "model/gltf-binary"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"glTF\x02\x00\x00\x00");
    assert_eq!(*source.queries.lock().unwrap(), vec![Some("sig=abc".to_string())]);
    assert!(fx.tools.calls().is_empty());
}

#[tokio::test]
async fn test_model_proxy_requires_url() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(
        app(&fx),
        Request::builder().uri("/api/model").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "URL parameter is required");
}

#[tokio::test]
async fn test_model_proxy_rejects_non_http() {
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(app(&fx), model_request("file:///etc/passwd")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["stage"], "validation");
}

#[tokio::test]
async fn test_model_proxy_upstream_failure() {
    let source = source_server(&[]).await;
    let fx = Fixture::new(ScriptedTools::ok());
    let (status, body) = send(app(&fx), model_request(&source.url("gone.glb?sig=abc"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch model" }));
}

// ── CORS ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let fx = Fixture::new(ScriptedTools::ok());
    let response = app(&fx)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_cors_preflight_for_upload() {
    let fx = Fixture::new(ScriptedTools::ok());
    let response = app(&fx)
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/convert/usdz-to-glb")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success(), "{}", response.status());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(fx.tools.calls().is_empty());
}
