//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password missing, or the email does not parse.
    #[error("invalid input")]
    InvalidInput,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// An account with this email exists but is not linked to the provider.
    #[error("account exists but is not linked to this provider")]
    AccountNotLinked,

    /// Session token missing, malformed, expired or forged.
    #[error("invalid session token")]
    InvalidToken,

    /// Signing a session token failed.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
