//! Credits CLI - Database migrations and payment inspection.
//!
//! # Usage
//!
//! ```bash
//! # Run portal database migrations
//! credits-cli migrate
//!
//! # Show a payment's gateway status
//! credits-cli payment status 123456789
//!
//! # Watch it until it settles, crediting the user when approved
//! credits-cli payment status 123456789 --watch --settle
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `payment status` - Read or watch a payment's status

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;

use commands::payment::StatusOptions;

#[derive(Parser)]
#[command(name = "credits-cli")]
#[command(author, version, about = "Credits portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect payments
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },
}

#[derive(Subcommand)]
enum PaymentAction {
    /// Show the gateway status of a payment
    Status {
        /// Gateway payment id
        payment_id: String,

        /// Poll until the payment reaches a terminal status
        #[arg(short, long)]
        watch: bool,

        /// Apply the observed status to the portal database
        #[arg(long)]
        settle: bool,

        /// First poll delay in milliseconds
        #[arg(long, default_value_t = 4000)]
        interval_ms: u64,

        /// Polls before giving up
        #[arg(long, default_value_t = 45)]
        max_attempts: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Payment { action } => match action {
            PaymentAction::Status {
                payment_id,
                watch,
                settle,
                interval_ms,
                max_attempts,
            } => {
                let options = StatusOptions {
                    watch,
                    settle,
                    interval: Duration::from_millis(interval_ms),
                    max_attempts,
                };
                commands::payment::status(&payment_id, options).await?;
            }
        },
    }
    Ok(())
}
