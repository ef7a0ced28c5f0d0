//! HTTP route handlers for the portal.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Liveness
//! GET  /health/ready               - Readiness (database)
//!
//! # Checkout
//! POST /api/checkout               - Create PIX/card checkout, or {op:"status"}
//! POST /api/webhooks/mercadopago   - Gateway notifications
//!
//! # Auth
//! POST /api/register               - Email/password sign-up
//! POST /api/auth/login             - Credential login (sets session cookie)
//! POST /api/auth/logout            - Clear session cookie
//! GET  /api/auth/session           - Current session
//! GET  /auth/google/login          - Redirect to Google
//! GET  /auth/google/callback       - Handle Google callback
//!
//! # Credits (requires auth)
//! GET  /api/credits                - Balance and ledger
//! ```

pub mod auth;
pub mod checkout;
pub mod credits;
pub mod google_auth;
pub mod health;
pub mod register;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the credential auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
}

/// Create the Google OAuth routes router.
pub fn google_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(google_auth::login))
        .route("/callback", get(google_auth::callback))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout::checkout))
}

/// Create all routes for the portal.
///
/// `rate_limit` keys limits on client IP headers, so it is only useful
/// behind a proxy that sets them.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let (auth, checkout) = if rate_limit {
        (
            auth_routes().layer(auth_rate_limiter()),
            checkout_routes().layer(api_rate_limiter()),
        )
    } else {
        (auth_routes(), checkout_routes())
    };

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", auth.merge(checkout))
        .route("/api/auth/session", get(auth::session))
        .route("/api/credits", get(credits::show))
        .route("/api/webhooks/mercadopago", post(webhooks::mercadopago))
        .nest("/auth/google", google_routes())
}
