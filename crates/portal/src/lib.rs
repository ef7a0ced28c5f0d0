//! Credits portal library.
//!
//! This crate provides the portal's HTTP service as a library, allowing it
//! to be tested end to end and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, middleware::from_fn};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
///
/// Layers, innermost first: sessions, request id, request tracing.
/// Sentry layers are added by the binary, which owns the Sentry client.
pub fn app(state: AppState, rate_limit: bool) -> Router {
    let router = middleware::with_sessions(
        routes::routes(rate_limit),
        state.pool(),
        state.config().is_secure(),
    );

    router
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
