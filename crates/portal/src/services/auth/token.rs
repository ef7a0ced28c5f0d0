//! Signed session tokens (HS256 JWT).
//!
//! The token carries the user id in `sub` plus the profile fields the
//! session view returns, so reading the session needs no database round trip.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use credits_core::{Email, UserId};

use super::AuthError;
use crate::models::CurrentUser;

/// Session lifetime.
pub const SESSION_TTL_DAYS: i64 = 30;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TryFrom<Claims> for CurrentUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
        let email = Email::parse(&claims.email).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self {
            id: UserId::new(id),
            email,
            name: claims.name,
            image: claims.picture,
        })
    }
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if signing fails.
    pub fn issue(&self, user: &CurrentUser) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.to_string(),
            name: user.name.clone(),
            picture: user.image.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify a token and return the identity it carries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for bad signatures, expired tokens
    /// and malformed claims.
    pub fn verify(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                AuthError::InvalidToken
            })?;
        CurrentUser::try_from(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&SecretString::from(secret.to_string()))
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(42),
            email: Email::parse("ana@example.com").unwrap(),
            name: Some("Ana".to_string()),
            image: None,
        }
    }

    #[test]
    fn test_issue_then_verify_carries_identity() {
        let issuer = issuer("k7#Qz!9vLm2@Xp4$Rt8&Wy1*Bn6^Cd3%");
        let token = issuer.issue(&user()).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), user());
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = issuer("first-secret-aaaaaaaaaaaaaaaaaaaaaa")
            .issue(&user())
            .unwrap();
        let err = issuer("second-secret-bbbbbbbbbbbbbbbbbbbbb")
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = issuer("k7#Qz!9vLm2@Xp4$Rt8&Wy1*Bn6^Cd3%");
        let claims = Claims {
            sub: "42".to_string(),
            email: "ana@example.com".to_string(),
            name: None,
            picture: None,
            iat: 0,
            exp: 1,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(issuer("k7#Qz!9vLm2@Xp4$Rt8&Wy1*Bn6^Cd3%")
            .verify("not.a.jwt")
            .is_err());
    }
}
