//! Credential login, logout and session view.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_session_cookie, session_cookie};
use crate::models::CurrentUser;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Login request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// Verify credentials and issue a session token.
///
/// The token is set as an `HttpOnly` cookie and also returned in the body
/// for clients that send it as a bearer token.
///
/// # Route
///
/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Response, AppError> {
    let auth = AuthService::new(state.users());

    let Some(user) = auth.authorize(&body.email, &body.password).await? else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "invalid-credentials" })),
        )
            .into_response());
    };

    signed_in(&state, &user)
}

/// Issue a token for `user` and build the login response.
pub(crate) fn signed_in(state: &AppState, user: &CurrentUser) -> Result<Response, AppError> {
    let token = state.tokens().issue(user)?;
    let cookie = session_cookie(
        &token,
        state.config().is_secure(),
        state.tokens().ttl().num_days(),
    )
    .ok_or_else(|| AppError::Internal("session cookie is not a valid header".to_string()))?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "user signed in");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "ok": true, "user": user, "token": token })),
    )
        .into_response())
}

/// Clear the session cookie.
///
/// # Route
///
/// `POST /api/auth/logout`
pub async fn logout(State(state): State<AppState>) -> Response {
    clear_sentry_user();

    let body = Json(json!({ "ok": true }));
    match clear_session_cookie(state.config().is_secure()) {
        Some(cookie) => ([(SET_COOKIE, cookie)], body).into_response(),
        None => body.into_response(),
    }
}

/// Current session.
///
/// `{ "user": {id, email, name, image} }` when signed in, `{}` otherwise.
///
/// # Route
///
/// `GET /api/auth/session`
pub async fn session(OptionalAuth(user): OptionalAuth) -> Json<serde_json::Value> {
    match user {
        Some(user) => Json(json!({ "user": user })),
        None => Json(json!({})),
    }
}
