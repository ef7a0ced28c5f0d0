//! Registration route handler.
//!
//! Response bodies are the user-facing messages the portal's sign-up form
//! displays as-is: `{ "ok": true }` or `{ "error": "<message>" }`.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::services::auth::{AuthError, AuthService, Registration};
use crate::state::AppState;

/// Registration request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterBody {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

/// Registration failures.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid registration data")]
    InvalidData,

    #[error("password too short")]
    PasswordTooShort,

    #[error("email already registered")]
    EmailTaken,

    #[error("registration failed: {0}")]
    Server(AuthError),
}

impl From<AuthError> for RegisterError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput => Self::InvalidData,
            AuthError::WeakPassword(_) => Self::PasswordTooShort,
            AuthError::UserAlreadyExists => Self::EmailTaken,
            other => Self::Server(other),
        }
    }
}

impl RegisterError {
    /// Message shown to the user.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::InvalidData => "Dados invalidos.",
            Self::PasswordTooShort => "Senha muito curta (min. 6).",
            Self::EmailTaken => "E-mail ja cadastrado.",
            Self::Server(_) => "Erro no servidor.",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidData | Self::PasswordTooShort => StatusCode::BAD_REQUEST,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        if let Self::Server(err) = &self {
            let event_id = sentry::capture_error(err);
            tracing::error!(error = %err, sentry_event_id = %event_id, "registration failed");
        }

        (
            self.status_code(),
            Json(json!({ "error": self.message() })),
        )
            .into_response()
    }
}

/// Create an account with email and password.
///
/// # Route
///
/// `POST /api/register`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, RegisterError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!(error = %e, "unreadable registration body");
        RegisterError::InvalidData
    })?;

    let registration = Registration {
        email: body.email.unwrap_or_default(),
        name: body.name,
        password: body.password.unwrap_or_default(),
    };

    AuthService::new(state.users())
        .register(&registration)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_messages() {
        let cases = [
            (AuthError::InvalidInput, StatusCode::BAD_REQUEST, "Dados invalidos."),
            (
                AuthError::WeakPassword("short".to_string()),
                StatusCode::BAD_REQUEST,
                "Senha muito curta (min. 6).",
            ),
            (AuthError::UserAlreadyExists, StatusCode::CONFLICT, "E-mail ja cadastrado."),
            (
                AuthError::PasswordHash,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Erro no servidor.",
            ),
        ];

        for (auth, status, message) in cases {
            let err = RegisterError::from(auth);
            assert_eq!(err.status_code(), status);
            assert_eq!(err.message(), message);
        }
    }
}
