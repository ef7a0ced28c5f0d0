//! Payment inspection commands.
//!
//! # Usage
//!
//! ```bash
//! # Current gateway status of a payment
//! credits-cli payment status 123456789
//!
//! # Poll until the payment settles (backoff, bounded attempts)
//! credits-cli payment status 123456789 --watch
//!
//! # Poll and apply the result to the portal database (credits approved payments)
//! credits-cli payment status 123456789 --watch --settle
//! ```
//!
//! # Environment Variables
//!
//! - `MP_ACCESS_TOKEN` - Mercado Pago access token
//! - `MP_API_BASE` - Mercado Pago API base URL (optional)
//! - `PORTAL_DATABASE_URL` - only with `--settle`
//! - `PORTAL_CREDITS_PER_BRL` - only with `--settle`, parsed as the portal does

use std::sync::Arc;
use std::time::Duration;

use credits_core::PaymentStatus;
use credits_portal::config::{GatewayConfig, credits_per_brl_from_env};
use credits_portal::db::{self, PgPaymentRepository};
use credits_portal::gateway::{GatewayError, MercadoPagoClient, PaymentGateway};
use credits_portal::services::{PollOutcome, PollerConfig, SettlementService, StatusPoller};

use super::{CommandError, database_url};

/// Options for `payment status`.
#[derive(Debug, Clone, Copy)]
pub struct StatusOptions {
    pub watch: bool,
    pub settle: bool,
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Show, and optionally watch, a payment's gateway status.
///
/// # Errors
///
/// Returns an error if the gateway is not configured or unreachable, or,
/// with `settle`, if the database cannot be reached.
pub async fn status(payment_id: &str, options: StatusOptions) -> Result<(), CommandError> {
    let config = GatewayConfig::from_env().ok_or(CommandError::MissingEnvVar("MP_ACCESS_TOKEN"))?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(MercadoPagoClient::new(&config)?);

    let settlement = if options.settle {
        let credits_per_brl = credits_per_brl_from_env()?;
        let pool = db::create_pool(&database_url()?).await?;
        Some(SettlementService::new(
            Arc::new(PgPaymentRepository::new(pool)),
            Arc::clone(&gateway),
            credits_per_brl,
        ))
    } else {
        None
    };

    if !options.watch {
        let status = match &settlement {
            Some(settlement) => {
                let (payment, observation) = settlement.refresh(payment_id).await?;
                tracing::info!(?observation, "applied to portal database");
                payment.status
            }
            None => gateway.get_payment(payment_id).await?.status,
        };
        print_status(payment_id, &status);
        return Ok(());
    }

    let poller = StatusPoller::new(PollerConfig {
        initial_interval: options.interval,
        max_attempts: options.max_attempts,
        ..PollerConfig::default()
    });

    tracing::info!(payment_id, config = ?poller.config(), "watching payment");

    let outcome = match settlement {
        Some(settlement) => {
            poller
                .run(|| {
                    let settlement = settlement.clone();
                    async move { settlement.check(payment_id).await }
                })
                .await
        }
        None => {
            poller
                .run(|| {
                    let gateway = Arc::clone(&gateway);
                    async move { fetch_status(gateway.as_ref(), payment_id).await }
                })
                .await
        }
    };

    match outcome {
        PollOutcome::Settled(status) => print_status(payment_id, status.as_str()),
        PollOutcome::Exhausted {
            attempts,
            last_status,
        } => {
            let last = last_status.map_or("unknown", |s| s.as_str());
            tracing::warn!(attempts, last_status = last, "gave up before the payment settled");
            print_status(payment_id, last);
        }
        PollOutcome::Cancelled => tracing::warn!("watch cancelled"),
    }

    Ok(())
}

async fn fetch_status(
    gateway: &dyn PaymentGateway,
    payment_id: &str,
) -> Result<PaymentStatus, GatewayError> {
    let payment = gateway.get_payment(payment_id).await?;
    PaymentStatus::parse(&payment.status)
        .ok_or_else(|| GatewayError::Parse(format!("unknown status {:?}", payment.status)))
}

#[allow(clippy::print_stdout)]
fn print_status(payment_id: &str, status: &str) {
    println!("{payment_id}\t{status}");
}
