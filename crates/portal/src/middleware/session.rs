//! Server-side session configuration.
//!
//! Sessions only hold short-lived OAuth state, so they expire quickly.
//! `PostgreSQL`-backed in production, in memory when running without a pool.

use axum::Router;
use sqlx::PgPool;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::state::AppState;

/// Session cookie name.
pub const OAUTH_SESSION_COOKIE_NAME: &str = "credits_oauth";

/// Session expiry time in seconds (15 minutes).
const SESSION_EXPIRY_SECONDS: i64 = 15 * 60;

/// Create the session layer over any store.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    secure: bool,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(OAUTH_SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Attach the session layer matching the state's storage.
pub fn with_sessions(
    router: Router<AppState>,
    pool: Option<&PgPool>,
    secure: bool,
) -> Router<AppState> {
    match pool {
        // The sessions table is created by migration
        Some(pool) => router.layer(create_session_layer(PostgresStore::new(pool.clone()), secure)),
        None => router.layer(create_session_layer(MemoryStore::default(), secure)),
    }
}
