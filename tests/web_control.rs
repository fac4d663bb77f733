//! Control API: authentication, capability checks and command dispatch.

mod common;

use autodrop_agent::config::DEFAULT_SERVER_URL;
use autodrop_agent::web::auth::JwtKeys;
use autodrop_agent::web::{AppStateInner, create_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Harness, harness};
use http_body_util::BodyExt; // for .collect().await
use serde_json::{Value, json};
use tower::util::ServiceExt; // for `oneshot`

async fn app() -> (Router, Harness) {
    let h = harness(|_| {}).await;
    let state = AppStateInner::new(h.agent.clone(), JwtKeys::new("test-secret", 3600));
    (create_router(state), h)
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let request = post("/api/v1/auth/login", None, json!({ "username": username, "password": password }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let (app, _h) = app().await;
    assert!(!login(&app, "admin", "password").await.is_empty());

    let request = post("/api/v1/auth/login", None, json!({ "username": "admin", "password": "wrong" }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_control_requires_admin() {
    let (app, h) = app().await;
    let request = post("/api/v1/autodrop3d", None, json!({ "command": "connect" }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let viewer = login(&app, "viewer", "viewer").await;
    let request = post("/api/v1/autodrop3d", Some(&viewer), json!({ "command": "connect" }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Insufficient rights");

    let request = post("/api/v1/autodrop3d", Some("not-a-token"), json!({ "command": "connect" }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!h.snapshot().await.enabled);
}

#[tokio::test]
async fn test_admin_connect_and_disconnect() {
    let (app, h) = app().await;
    h.printer.connect();
    let token = login(&app, "admin", "password").await;

    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "connect" }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "enabled": true }));
    assert!(h.wait_until(|s| s.job_queue_running).await.enabled);

    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "disconnect" }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(json_body(response).await, json!({ "enabled": false }));
    assert!(!h.snapshot().await.job_queue_running);
}

#[tokio::test]
async fn test_get_default_server_url() {
    let (app, _h) = app().await;
    let token = login(&app, "admin", "password").await;
    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "get_default_server_url" }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "url": DEFAULT_SERVER_URL }));
}

#[tokio::test]
async fn test_bad_commands_are_rejected() {
    let (app, _h) = app().await;
    let token = login(&app, "admin", "password").await;

    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "bed_cleared", "filename": "" }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "explode" }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bed_cleared_over_http() {
    let (app, h) = app().await;
    h.printer.connect();
    h.start_job42().await;
    h.printer.finish();
    h.wait_until(|s| s.last_event == Some(autodrop_shared::EventKind::PrintDone)).await;

    let token = login(&app, "admin", "password").await;
    let request = post(
        "/api/v1/autodrop3d",
        Some(&token),
        json!({ "command": "bed_cleared", "filename": common::JOB_PATH }),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "bed_cleared": true, "enabled": false }));
    assert!(h.snapshot().await.bed_clear);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let (app, _h) = app().await;
    let token = login(&app, "admin", "password").await;

    let response = app.clone().oneshot(post("/api/v1/auth/logout", Some(&token), json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = post("/api/v1/autodrop3d", Some(&token), json!({ "command": "connect" }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.oneshot(get("/api/v1/autodrop3d/status", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_needs_any_valid_token() {
    let (app, _h) = app().await;
    let response = app.clone().oneshot(get("/api/v1/autodrop3d/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let viewer = login(&app, "viewer", "viewer").await;
    let response = app.oneshot(get("/api/v1/autodrop3d/status", Some(&viewer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = json_body(response).await;
    assert_eq!(status["enabled"], false);
    assert_eq!(status["bed_clear"], true);
    assert_eq!(status["printer"], "printer-1");
    assert_eq!(status["auto_eject_active"], false);
    assert!(status["current_job"].is_null());
}

#[tokio::test]
async fn test_events_need_a_token() {
    let (app, _h) = app().await;
    let response = app.oneshot(get("/api/v1/autodrop3d/events", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
