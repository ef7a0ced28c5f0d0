//! Credits health - standalone liveness server.
//!
//! Answers `GET /health` with `{"status":"ok"}` on `0.0.0.0`, port
//! `HEALTH_PORT` (then `PORT`, then 4000). Any origin may call it.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::{Ipv4Addr, SocketAddr};

use axum::{Json, Router, routing::get};
use serde::Serialize;
use tower_http::cors::CorsLayer;

const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn app() -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
}

/// Port from the first of `HEALTH_PORT`, `PORT` that parses.
fn port_from(lookup: impl Fn(&str) -> Option<String>) -> u16 {
    ["HEALTH_PORT", "PORT"]
        .into_iter()
        .find_map(|key| lookup(key).and_then(|v| v.trim().parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "credits_health=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let port = port_from(|key| std::env::var(key).ok());
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("health server listening on {}", addr);

    axum::serve(listener, app()).await.expect("Server error");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_returns_ok_json() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_health_allows_any_origin() {
        let response = app()
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_port_precedence() {
        assert_eq!(port_from(|_| None), DEFAULT_PORT);
        assert_eq!(
            port_from(|k| (k == "PORT").then(|| "8080".to_string())),
            8080
        );
        assert_eq!(
            port_from(|k| Some(if k == "HEALTH_PORT" { "4100" } else { "8080" }.to_string())),
            4100
        );
        assert_eq!(
            port_from(|k| Some(if k == "HEALTH_PORT" { "nope" } else { "8080" }.to_string())),
            8080
        );
    }
}
