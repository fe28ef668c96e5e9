//! Image re-hosting through the public API, and the admin API around it.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use portal_api::admin::setup_admin_router;
use portal_api::config::StoreConfig;

mod common;

use common::{MockResponse, TestApp};

const ADMIN_KEY: &str = "test-admin-key";
const CDN: &str = "https://cdn.example.test";

async fn image_app(dir: &tempfile::TempDir) -> TestApp {
    let mut config = common::test_config();
    config.images.enabled = true;
    config.images.store = StoreConfig::Local {
        root: dir.path().to_string_lossy().to_string(),
        public_base_url: CDN.to_string(),
    };
    config.admin.api_key = ADMIN_KEY.to_string();
    TestApp::with_config(config).await
}

async fn admin(app: &TestApp, method: Method, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    let response = setup_admin_router(app.state.clone())
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_cache_then_proxy_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let app = image_app(&dir).await;
    let (token, _) = app.register("artist").await;

    let source = common::start_programmable_backend(|_| async {
        MockResponse {
            status: 200,
            content_type: "image/png",
            body: "not-really-a-png".to_string(),
        }
    })
    .await;
    let source_url = format!("http://{}/art/cat.png", source);

    let (status, body) = app
        .post("/api/images/cache", Some(&token), json!({ "url": source_url }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fresh"], true);
    let cdn_url = body["data"]["url"].as_str().unwrap().to_string();
    assert!(cdn_url.starts_with(CDN));
    assert!(cdn_url.ends_with(".png"));

    // The second call is served from the record.
    let (_, body) = app
        .post("/api/images/cache", Some(&token), json!({ "url": source_url }))
        .await;
    assert_eq!(body["data"]["fresh"], false);
    assert_eq!(body["data"]["url"], cdn_url);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/images/proxy?url={}", source_url))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], cdn_url.as_str());

    let (status, body) = admin(&app, Method::GET, "/admin/images", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], true);
    assert_eq!(body["data"]["store"], "local");
    assert_eq!(body["data"]["count"], 1);
}

#[tokio::test]
async fn test_cache_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let app = image_app(&dir).await;
    let (token, _) = app.register("critic").await;

    let (status, _) = app
        .post("/api/images/cache", None, json!({ "url": "https://img.example.com/a.png" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/images/cache", Some(&token), json!({ "url": "file:///etc/passwd" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let page = common::start_programmable_backend(|_| async { MockResponse::html(200, "<html></html>") }).await;
    let (status, _) = app
        .post(
            "/api/images/cache",
            Some(&token),
            json!({ "url": format!("http://{}/index.html", page) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = common::start_programmable_backend(|_| async { MockResponse::json(404, "{}") }).await;
    let (status, _) = app
        .post(
            "/api/images/cache",
            Some(&token),
            json!({ "url": format!("http://{}/gone.png", missing) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_admin_requires_key() {
    let dir = tempfile::tempdir().unwrap();
    let app = image_app(&dir).await;

    let (status, _) = admin(&app, Method::GET, "/admin/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = admin(&app, Method::GET, "/admin/status", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.get("/health", None).await;
    let (status, body) = admin(&app, Method::GET, "/admin/status", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "operational");
    assert!(body["data"]["total_requests"].as_u64().unwrap() >= 1);

    let (status, body) = admin(&app, Method::POST, "/admin/cache/clear", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared_groups"], 0);

    let (status, body) = admin(&app, Method::GET, "/admin/upstreams", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}
