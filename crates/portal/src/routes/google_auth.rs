//! Google OAuth route handlers.
//!
//! - Login: stores a CSRF state in the session and redirects to Google
//! - Callback: validates state, exchanges the code, signs the user in
//!
//! Failures redirect to `/login?error=<code>` so the sign-in page can show
//! a message. Both routes answer 404 when Google is not configured.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use rand::Rng;
use serde::Deserialize;
use tower_sessions::Session;

use crate::middleware::session_cookie;
use crate::models::{CurrentUser, session_keys};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Where Google sends the user back to.
pub const CALLBACK_PATH: &str = "/auth/google/callback";

/// Query parameters from the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for a token.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if the user denied access.
    pub error: Option<String>,
}

/// Generate a random alphanumeric string.
fn generate_state(length: usize) -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn login_error(code: &str) -> Response {
    Redirect::to(&format!("/login?error={code}")).into_response()
}

/// Start Google sign-in.
///
/// # Route
///
/// `GET /auth/google/login`
pub async fn login(State(state): State<AppState>, session: Session) -> Response {
    let Some(google) = state.google() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let oauth_state = generate_state(32);
    if let Err(e) = session
        .insert(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
        .await
    {
        tracing::error!(error = %e, "failed to store OAuth state in session");
        return login_error("session");
    }

    let redirect_uri = state.config().url_for(CALLBACK_PATH);
    Redirect::to(&google.authorization_url(&redirect_uri, &oauth_state)).into_response()
}

/// Handle the Google callback.
///
/// # Route
///
/// `GET /auth/google/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(google) = state.google() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Google OAuth denied");
        return login_error("AccessDenied");
    }

    let Some(code) = query.code else {
        tracing::warn!("Google OAuth callback missing code");
        return login_error("OAuthCallback");
    };

    let stored_state: Option<String> = session
        .remove(session_keys::GOOGLE_OAUTH_STATE)
        .await
        .ok()
        .flatten();

    if stored_state.is_none() || stored_state != query.state {
        tracing::warn!("Google OAuth state mismatch");
        return login_error("OAuthCallback");
    }

    let redirect_uri = state.config().url_for(CALLBACK_PATH);
    let profile = match google.exchange_code(&code, &redirect_uri).await {
        Ok(token) => google.fetch_profile(&token).await,
        Err(e) => Err(e),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(error = %e, "Google OAuth exchange failed");
            return login_error("OAuthCallback");
        }
    };

    let user = match AuthService::new(state.users())
        .sign_in_with_google(&profile)
        .await
    {
        Ok(user) => CurrentUser::from(user),
        Err(AuthError::AccountNotLinked) => {
            tracing::info!("Google identity matches an unlinked account");
            return login_error("OAuthAccountNotLinked");
        }
        Err(e) => {
            tracing::error!(error = %e, "Google sign-in failed");
            return login_error("OAuthCallback");
        }
    };

    let cookie = state
        .tokens()
        .issue(&user)
        .ok()
        .and_then(|token| {
            session_cookie(
                &token,
                state.config().is_secure(),
                state.tokens().ttl().num_days(),
            )
        });
    let Some(cookie) = cookie else {
        tracing::error!(user_id = %user.id, "failed to issue session token");
        return login_error("OAuthCallback");
    };

    tracing::info!(user_id = %user.id, "user signed in with Google");
    ([(SET_COOKIE, cookie)], Redirect::to("/portal")).into_response()
}
