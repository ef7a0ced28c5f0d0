//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string (fallback: `DATABASE_URL`)
//! - `PORTAL_BASE_URL` - Public URL of the portal (fallback: `NEXT_PUBLIC_BASE_URL`)
//! - `PORTAL_SESSION_SECRET` - Session token signing secret, min 32 chars, high
//!   entropy (fallback: `NEXTAUTH_SECRET`)
//!
//! ## Optional
//! - `PORTAL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORTAL_PORT` - Listen port (default: 3000)
//! - `MP_ACCESS_TOKEN` - Mercado Pago access token; checkout is disabled without it
//! - `MP_API_BASE` - Mercado Pago API base URL (default: <https://api.mercadopago.com>)
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - Google OAuth credentials (both or neither)
//! - `PORTAL_CREDITS_PER_BRL` - Credits granted per real recharged (default: 10)
//! - `PORTAL_POLL_INTERVAL_MS` - First PIX status poll delay (default: 4000)
//! - `PORTAL_POLL_MAX_ATTEMPTS` - PIX status polls before giving up (default: 45)
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::services::poller::PollerConfig;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const CREDITS_PER_BRL_VAR: &str = "PORTAL_CREDITS_PER_BRL";

/// Default Mercado Pago REST API base.
pub const DEFAULT_MP_API_BASE: &str = "https://api.mercadopago.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Portal application configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    /// Session token signing secret
    pub session_secret: SecretString,
    /// Payment gateway configuration (`None` disables checkout)
    pub gateway: Option<GatewayConfig>,
    /// Google OAuth configuration (`None` disables Google sign-in)
    pub google: Option<GoogleOAuthConfig>,
    /// Credits granted per real recharged
    pub credits_per_brl: u32,
    /// Background PIX status polling
    pub poller: PollerConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Mercado Pago API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Private access token (`APP_USR-...` or `TEST-...`)
    pub access_token: SecretString,
    /// REST API base URL
    pub api_base: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("access_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Google OAuth client configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
}

impl std::fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("PORTAL_DATABASE_URL")?;
        let host = parse_env("PORTAL_HOST", "127.0.0.1")?;
        let port = parse_env("PORTAL_PORT", "3000")?;
        let base_url = normalize_base_url(
            "PORTAL_BASE_URL",
            &get_env_with_fallback("PORTAL_BASE_URL", "NEXT_PUBLIC_BASE_URL")?,
        )?;
        let session_secret = SecretString::from(get_env_with_fallback(
            "PORTAL_SESSION_SECRET",
            "NEXTAUTH_SECRET",
        )?);
        validate_session_secret(&session_secret, "PORTAL_SESSION_SECRET")?;
        validate_secret_strength(session_secret.expose_secret(), "PORTAL_SESSION_SECRET")?;

        let gateway = GatewayConfig::from_env();
        let google = GoogleOAuthConfig::from_env()?;
        let credits_per_brl = credits_per_brl_from_env()?;

        let interval_ms: u64 = parse_env("PORTAL_POLL_INTERVAL_MS", "4000")?;
        let max_attempts: u32 = parse_env("PORTAL_POLL_MAX_ATTEMPTS", "45")?;
        let poller = PollerConfig {
            initial_interval: Duration::from_millis(interval_ms),
            max_attempts,
            ..PollerConfig::default()
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            gateway,
            google,
            credits_per_brl,
            poller,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Absolute URL for a path on this portal.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl GatewayConfig {
    /// Load gateway settings, or `None` when `MP_ACCESS_TOKEN` is unset or blank.
    ///
    /// The token is not entropy-checked: sandbox tokens are structured
    /// (`TEST-<digits>-...`) and the gateway rejects bad ones itself.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let access_token = get_optional_env("MP_ACCESS_TOKEN").filter(|t| !t.trim().is_empty())?;
        Some(Self {
            access_token: SecretString::from(access_token),
            api_base: get_env_or_default("MP_API_BASE", DEFAULT_MP_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl GoogleOAuthConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let client_id = get_optional_env("GOOGLE_CLIENT_ID").filter(|v| !v.is_empty());
        let client_secret = get_optional_env("GOOGLE_CLIENT_SECRET").filter(|v| !v.is_empty());

        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Some(Self {
                client_id,
                client_secret: SecretString::from(client_secret),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingEnvVar(
                "GOOGLE_CLIENT_SECRET".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".to_string())),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required variable, accepting the legacy name as a fallback.
fn get_env_with_fallback(primary: &str, legacy: &str) -> Result<String, ConfigError> {
    get_required_env(primary).or_else(|_| {
        std::env::var(legacy).map_err(|_| ConfigError::MissingEnvVar(primary.to_string()))
    })
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    get_env_with_fallback(primary_key, "DATABASE_URL").map(SecretString::from)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Credits granted per real, from `PORTAL_CREDITS_PER_BRL` (default: 10).
///
/// Shared with the CLI so both credit approved payments at the same rate.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` if the value is not a positive
/// integer.
pub fn credits_per_brl_from_env() -> Result<u32, ConfigError> {
    parse_credits_per_brl(&get_env_or_default(CREDITS_PER_BRL_VAR, "10"))
}

fn parse_credits_per_brl(raw: &str) -> Result<u32, ConfigError> {
    let rate: u32 = parse_value(CREDITS_PER_BRL_VAR, raw)?;
    if rate == 0 {
        return Err(ConfigError::InvalidEnvVar(
            CREDITS_PER_BRL_VAR.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(rate)
}

/// Validate an absolute http(s) URL and strip the trailing slash.
fn normalize_base_url(var_name: &str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> PortalConfig {
        PortalConfig {
            database_url: SecretString::from("postgres://localhost/credits"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: base_url.to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            gateway: None,
            google: None,
            credits_per_brl: 10,
            poller: PollerConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("changeme-now-please-0123456789", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("X", "https://creditos.app/").unwrap(),
            "https://creditos.app"
        );
        assert!(normalize_base_url("X", "creditos.app").is_err());
        assert!(normalize_base_url("X", "ftp://creditos.app").is_err());
    }

    #[test]
    fn test_parse_credits_per_brl() {
        assert_eq!(parse_credits_per_brl("10").unwrap(), 10);
        assert_eq!(parse_credits_per_brl("25").unwrap(), 25);

        for raw in ["", "ten", "-5", "1.5", "0"] {
            let err = parse_credits_per_brl(raw).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidEnvVar(key, _) if key == "PORTAL_CREDITS_PER_BRL"),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_socket_addr_and_urls() {
        let config = test_config("http://localhost:3000");
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(!config.is_secure());
        assert_eq!(
            config.url_for("/portal?paid=1"),
            "http://localhost:3000/portal?paid=1"
        );
        assert!(test_config("https://creditos.app").is_secure());
    }

    #[test]
    fn test_gateway_config_debug_redacts_token() {
        let config = GatewayConfig {
            access_token: SecretString::from("APP_USR-super-secret-token"),
            api_base: DEFAULT_MP_API_BASE.to_string(),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.mercadopago.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-token"));
    }

    #[test]
    fn test_google_config_debug_redacts_secret() {
        let config = GoogleOAuthConfig {
            client_id: "client-id-value".to_string(),
            client_secret: SecretString::from("google-client-secret-value"),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("client-id-value"));
        assert!(!debug_output.contains("google-client-secret-value"));
    }
}
