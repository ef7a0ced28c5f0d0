//! Persistence for the credits portal.
//!
//! # Database: `credits_portal`
//!
//! ## Tables
//!
//! - `users` - Portal accounts (email + optional Argon2 password hash)
//! - `oauth_accounts` - External identities linked to users
//! - `payment_intents` - One row per checkout attempt and its observed status
//! - `credit_ledger` - Append-only balance movements
//! - `credit_balances` - Current balance per user
//! - `tower_sessions.session` - Server-side sessions (OAuth state)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/portal/migrations/` and run via:
//! ```bash
//! cargo run -p credits-cli -- migrate
//! ```
//!
//! Handlers talk to the [`UserStore`] and [`PaymentStore`] traits. The
//! Postgres repositories back them in production, [`memory`] in tests.

pub mod memory;
pub mod payments;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use credits_core::{Credits, Email, IntentId, PaymentStatus, UserId};

use crate::models::{
    GatewayRefs, LedgerEntry, NewIntent, NewUser, OAuthAccount, PaymentIntent, Settlement, User,
};

pub use memory::{MemoryPaymentStore, MemoryUserStore};
pub use payments::PgPaymentRepository;
pub use users::PgUserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to `Conflict`, everything else to `Database`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Storage for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get a user by their ID.
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by their email address (exact match).
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Get a user together with their password hash.
    ///
    /// Users without a password (OAuth-only) yield `None`.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Create a user.
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    async fn create(&self, user: &NewUser) -> Result<User, RepositoryError>;

    /// Get the user linked to an external account.
    async fn get_by_oauth(&self, account: &OAuthAccount) -> Result<Option<User>, RepositoryError>;

    /// Create a user and link the external account in one step.
    ///
    /// Returns `RepositoryError::Conflict` if the email or the account is taken.
    async fn create_with_oauth(
        &self,
        user: &NewUser,
        account: &OAuthAccount,
    ) -> Result<User, RepositoryError>;
}

/// Storage for payment intents and credit balances.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Record a new pending intent.
    async fn create_intent(&self, intent: &NewIntent) -> Result<PaymentIntent, RepositoryError>;

    /// Attach gateway references once the charge or preference exists.
    async fn attach_gateway_refs(
        &self,
        id: IntentId,
        refs: &GatewayRefs,
    ) -> Result<(), RepositoryError>;

    /// Get an intent by its id.
    async fn get_intent(&self, id: IntentId) -> Result<Option<PaymentIntent>, RepositoryError>;

    /// Get an intent by the gateway payment id.
    async fn get_intent_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentIntent>, RepositoryError>;

    /// Store an observed status and the payment id it was observed on,
    /// but only while the intent is still in `expected`.
    ///
    /// Callers check [`PaymentStatus::can_transition_to`] against `expected`
    /// first. Returns `false` when the intent is gone or another observer
    /// changed its status in between.
    async fn update_status(
        &self,
        id: IntentId,
        expected: PaymentStatus,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, RepositoryError>;

    /// Credit an approved intent exactly once.
    ///
    /// Marking the intent and writing the ledger entry happen atomically; a
    /// second call for the same intent returns [`Settlement::AlreadySettled`].
    async fn settle(&self, id: IntentId, credits: Credits) -> Result<Settlement, RepositoryError>;

    /// Current balance of a user (zero if they never bought credits).
    async fn balance(&self, user_id: UserId) -> Result<Credits, RepositoryError>;

    /// Most recent ledger entries of a user, newest first.
    async fn ledger(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
