//! Google OAuth 2.0 client (authorization code flow).
//!
//! # Flow
//!
//! 1. Generate authorization URL with `authorization_url()`
//! 2. Redirect the user to Google's consent page
//! 3. Google redirects back with an authorization code
//! 4. Exchange the code for an access token with `exchange_code()`
//! 5. Read the profile with `fetch_profile()`

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Errors from the OAuth provider.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the request.
    #[error("provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// The profile has no usable email.
    #[error("profile has no verified email")]
    UnverifiedEmail,
}

/// Provider endpoints. Overridable for tests.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub authorize: String,
    pub token: String,
    pub userinfo: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorize: AUTHORIZE_URL.to_string(),
            token: TOKEN_URL.to_string(),
            userinfo: USERINFO_URL.to_string(),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// `OpenID` Connect userinfo.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Stable Google account id.
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Client for Google's OAuth endpoints.
#[derive(Clone)]
pub struct GoogleClient {
    inner: Arc<GoogleClientInner>,
}

struct GoogleClientInner {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    endpoints: GoogleEndpoints,
}

impl GoogleClient {
    /// Create a client against Google's production endpoints.
    #[must_use]
    pub fn new(config: &GoogleOAuthConfig) -> Self {
        Self::with_endpoints(config, GoogleEndpoints::default())
    }

    /// Create a client against custom endpoints.
    #[must_use]
    pub fn with_endpoints(config: &GoogleOAuthConfig, endpoints: GoogleEndpoints) -> Self {
        Self {
            inner: Arc::new(GoogleClientInner {
                client: reqwest::Client::new(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                endpoints,
            }),
        }
    }

    /// Generate the authorization URL for sign-in.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - The callback URL Google redirects to
    /// * `state` - A random string stored in the session to prevent CSRF attacks
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope=openid%20email%20profile&\
            state={}",
            self.inner.endpoints.authorize,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .inner
            .client
            .post(&self.inner.endpoints.token)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider { status, message });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Fetch the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the email is missing or
    /// unverified.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, OAuthError> {
        let response = self
            .inner
            .client
            .get(&self.inner.endpoints.userinfo)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider { status, message });
        }

        let profile: GoogleProfile = response.json().await?;
        if profile.email.is_none() || !profile.email_verified {
            return Err(OAuthError::UnverifiedEmail);
        }
        Ok(profile)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn config() -> GoogleOAuthConfig {
        GoogleOAuthConfig {
            client_id: "client id".to_string(),
            client_secret: SecretString::from("s3cr3t"),
        }
    }

    fn client(server: &MockServer) -> GoogleClient {
        GoogleClient::with_endpoints(
            &config(),
            GoogleEndpoints {
                authorize: server.url("/auth"),
                token: server.url("/token"),
                userinfo: server.url("/userinfo"),
            },
        )
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let client = GoogleClient::new(&config());
        let url = client.authorization_url("https://app.test/auth/google/callback", "st&te");

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.test%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("state=st%26te"));
        assert!(url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn test_exchange_code_and_fetch_profile() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .json_body(json!({ "access_token": "ya29.token", "token_type": "Bearer" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/userinfo")
                    .header("authorization", "Bearer ya29.token");
                then.status(200).json_body(json!({
                    "sub": "1234",
                    "email": "ana@gmail.com",
                    "email_verified": true,
                    "name": "Ana",
                    "picture": "https://lh3.googleusercontent.com/a"
                }));
            })
            .await;

        let client = client(&server);
        let token = client.exchange_code("code", "http://cb").await.unwrap();
        let profile = client.fetch_profile(&token).await.unwrap();

        assert_eq!(profile.sub, "1234");
        assert_eq!(profile.email.as_deref(), Some("ana@gmail.com"));
        assert_eq!(profile.name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_unverified_email_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/userinfo");
                then.status(200).json_body(json!({
                    "sub": "1234",
                    "email": "ana@gmail.com",
                    "email_verified": false
                }));
            })
            .await;

        let err = client(&server).fetch_profile("t").await.unwrap_err();
        assert!(matches!(err, OAuthError::UnverifiedEmail));
    }

    #[tokio::test]
    async fn test_exchange_code_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({ "error": "invalid_grant" }));
            })
            .await;

        let err = client(&server)
            .exchange_code("bad", "http://cb")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Provider { status: 400, .. }));
    }
}
