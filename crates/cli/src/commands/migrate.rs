//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! credits-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PORTAL_DATABASE_URL` (fallback `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! `crates/portal/migrations/`, embedded at build time.

use credits_portal::db;

use super::{CommandError, database_url};

/// Run the portal's database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails
/// or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to portal database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running portal migrations...");
    sqlx::migrate!("../portal/migrations").run(&pool).await?;

    tracing::info!("Portal migrations complete!");
    Ok(())
}
