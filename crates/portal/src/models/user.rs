//! User domain types.

use chrono::{DateTime, Utc};

use credits_core::{Email, UserId};

/// A portal user (domain type).
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name, if given at registration or by the OAuth provider.
    pub name: Option<String>,
    /// Avatar URL from the OAuth provider.
    pub image: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// Data needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub name: Option<String>,
    pub image: Option<String>,
    /// Argon2 PHC string. `None` for users who only sign in through OAuth.
    pub password_hash: Option<String>,
}

/// Link between a user and an external identity provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthAccount {
    /// Provider name (`google`).
    pub provider: String,
    /// Stable account id issued by the provider (`sub` claim).
    pub provider_account_id: String,
}

impl OAuthAccount {
    /// A Google account link.
    #[must_use]
    pub fn google(subject: impl Into<String>) -> Self {
        Self {
            provider: "google".to_string(),
            provider_account_id: subject.into(),
        }
    }
}
