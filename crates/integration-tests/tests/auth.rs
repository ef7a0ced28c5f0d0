//! Credential login, logout and session lookup.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};
use credits_integration_tests::TestApp;
use credits_portal::middleware::SESSION_COOKIE_NAME;
use serde_json::json;

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let app = TestApp::new();
    app.post_json(
        "/api/register",
        &json!({ "email": "login@example.com", "name": "Login", "password": "secret123" }),
        None,
    )
    .await;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "login@example.com", "password": "secret123" }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ok"], true);
    assert_eq!(response.body["user"]["email"], "login@example.com");
    assert_eq!(response.body["user"]["name"], "Login");

    let cookie = response
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE_NAME}=")))
        .unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = TestApp::new();
    app.sign_up("wrong@example.com", "secret123").await;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "wrong@example.com", "password": "nope-nope" }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "ok": false, "error": "invalid-credentials" }));
    assert!(response.cookie(SESSION_COOKIE_NAME).is_none());
    assert!(response.body.get("token").is_none());
}

#[tokio::test]
async fn test_login_unknown_email() {
    let app = TestApp::new();

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "ghost@example.com", "password": "secret123" }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_reflects_token() {
    let app = TestApp::new();
    let token = app.sign_up("session@example.com", "secret123").await;

    let signed_in = app.get("/api/auth/session", Some(&token)).await;
    assert_eq!(signed_in.status, StatusCode::OK);
    assert_eq!(signed_in.body["user"]["email"], "session@example.com");

    let anonymous = app.get("/api/auth/session", None).await;
    assert_eq!(anonymous.body, json!({}));

    let forged = app.get("/api/auth/session", Some("not.a.token")).await;
    assert_eq!(forged.body, json!({}));
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new();

    let response = app.post_json("/api/auth/logout", &json!({}), None).await;

    assert_eq!(response.status, StatusCode::OK);
    let cookie = response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=;")));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_google_routes_absent_without_config() {
    let app = TestApp::new();

    let response = app.get("/auth/google/login", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let live = app.get("/health", None).await;
    assert_eq!(live.status, StatusCode::OK);

    // No database pool in tests.
    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;

    assert!(response.headers.contains_key("x-request-id"));
}
