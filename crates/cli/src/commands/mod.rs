//! CLI subcommands.

pub mod migrate;
pub mod payment;

use secrecy::SecretString;

/// Errors shared by the subcommands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] credits_portal::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] credits_portal::gateway::GatewayError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] credits_portal::services::SettlementError),
}

/// Database URL, with the same fallback as the portal.
pub(crate) fn database_url() -> Result<SecretString, CommandError> {
    std::env::var("PORTAL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("PORTAL_DATABASE_URL"))
}
