//! Authentication service.
//!
//! Provides email/password registration and verification, and sign-in
//! through an external identity provider.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{Claims, TokenIssuer};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use credits_core::Email;

use crate::db::{RepositoryError, UserStore};
use crate::models::{CurrentUser, NewUser, OAuthAccount, User};
use crate::oauth::GoogleProfile;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Registration input.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

/// Authentication service.
///
/// Handles user registration, credential login, and OAuth account linking.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a dyn UserStore) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if the email or password is missing,
    /// or the email does not parse.
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, registration: &Registration) -> Result<User, AuthError> {
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(AuthError::InvalidInput);
        }

        validate_password(&registration.password)?;

        let email = Email::parse(&registration.email).map_err(|_| AuthError::InvalidInput)?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(&registration.password)?;
        let name = registration
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);

        // Conflict here means a concurrent registration won the race.
        let user = self
            .users
            .create(&NewUser {
                email,
                name,
                image: None,
                password_hash: Some(password_hash),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, email = %user.email.redacted(), "user registered");
        Ok(user)
    }

    /// Verify email and password.
    ///
    /// Returns the minimal identity on success and `None` for anything that
    /// is not a valid credential pair: malformed email, short password,
    /// unknown user, OAuth-only user or wrong password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` only when the lookup itself fails.
    pub async fn authorize(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<CurrentUser>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Ok(None);
        }

        let Some((user, password_hash)) = self.users.get_password_hash(&email).await? else {
            return Ok(None);
        };

        if verify_password(password, &password_hash).is_err() {
            tracing::info!(user_id = %user.id, "password verification failed");
            return Ok(None);
        }

        Ok(Some(CurrentUser::from(user)))
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Find or create the user for a Google profile.
    ///
    /// A profile already linked signs in directly. An unknown profile whose
    /// email is free creates a new user linked to it. An unknown profile
    /// whose email belongs to an existing account is refused.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotLinked` when the email is taken by an
    /// account not linked to this Google identity.
    pub async fn sign_in_with_google(&self, profile: &GoogleProfile) -> Result<User, AuthError> {
        let account = OAuthAccount::google(&profile.sub);

        if let Some(user) = self.users.get_by_oauth(&account).await? {
            return Ok(user);
        }

        let email = profile
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|_| AuthError::InvalidInput)?
            .ok_or(AuthError::InvalidInput)?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountNotLinked);
        }

        let user = self
            .users
            .create_with_oauth(
                &NewUser {
                    email,
                    name: profile.name.clone(),
                    image: profile.picture.clone(),
                    password_hash: None,
                },
                &account,
            )
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::AccountNotLinked,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "user created from Google sign-in");
        Ok(user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidInput)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidInput)
}
