//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::PortalConfig;
use crate::db::{PaymentStore, PgPaymentRepository, PgUserRepository, UserStore};
use crate::gateway::{GatewayError, MercadoPagoClient, PaymentGateway};
use crate::oauth::GoogleClient;
use crate::services::auth::TokenIssuer;
use crate::services::{CheckoutService, PollerRegistry, SettlementService, StatusPoller};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like stores, the payment gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    pool: Option<PgPool>,
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentStore>,
    checkout: Option<CheckoutService>,
    settlement: Option<SettlementService>,
    google: Option<GoogleClient>,
    tokens: TokenIssuer,
    poller: StatusPoller,
    pollers: PollerRegistry,
}

impl AppState {
    /// Create the production state: Postgres stores, the Mercado Pago
    /// client when a token is configured, Google when credentials are set.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway HTTP client cannot be built.
    pub fn new(config: PortalConfig, pool: PgPool) -> Result<Self, GatewayError> {
        let gateway = config
            .gateway
            .as_ref()
            .map(MercadoPagoClient::new)
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn PaymentGateway>);
        let google = config.google.as_ref().map(GoogleClient::new);

        Ok(Self::from_parts(
            config,
            Some(pool.clone()),
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgPaymentRepository::new(pool)),
            gateway,
            google,
        ))
    }

    /// Assemble state from explicit parts.
    ///
    /// Without a pool, sessions live in memory and the readiness check
    /// always passes.
    #[must_use]
    pub fn from_parts(
        config: PortalConfig,
        pool: Option<PgPool>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        google: Option<GoogleClient>,
    ) -> Self {
        let settlement = gateway.as_ref().map(|gateway| {
            SettlementService::new(
                Arc::clone(&payments),
                Arc::clone(gateway),
                config.credits_per_brl,
            )
        });
        let checkout = gateway.zip(settlement.clone()).map(|(gateway, settlement)| {
            CheckoutService::new(
                Arc::clone(&payments),
                gateway,
                settlement,
                config.base_url.clone(),
            )
        });
        let tokens = TokenIssuer::new(&config.session_secret);
        let poller = StatusPoller::new(config.poller);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                users,
                payments,
                checkout,
                settlement,
                google,
                tokens,
                poller,
                pollers: PollerRegistry::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// The database pool, when running against Postgres.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.users.as_ref()
    }

    #[must_use]
    pub fn payments(&self) -> &dyn PaymentStore {
        self.inner.payments.as_ref()
    }

    /// Checkout, or `None` when no gateway is configured.
    #[must_use]
    pub fn checkout(&self) -> Option<&CheckoutService> {
        self.inner.checkout.as_ref()
    }

    /// Settlement, or `None` when no gateway is configured.
    #[must_use]
    pub fn settlement(&self) -> Option<&SettlementService> {
        self.inner.settlement.as_ref()
    }

    /// Google sign-in, or `None` when not configured.
    #[must_use]
    pub fn google(&self) -> Option<&GoogleClient> {
        self.inner.google.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    #[must_use]
    pub fn pollers(&self) -> &PollerRegistry {
        &self.inner.pollers
    }

    /// Poll a payment in the background until it settles.
    ///
    /// Returns `false` when a poller for this payment is already running or
    /// no gateway is configured.
    pub fn watch_payment(&self, payment_id: &str) -> bool {
        let Some(settlement) = self.inner.settlement.clone() else {
            return false;
        };
        let poller = self.inner.poller;
        let id = payment_id.to_string();

        let span = tracing::info_span!("payment_watch", payment_id = %id);
        let _guard = span.enter();

        self.inner.pollers.start_unique(payment_id, move || {
            poller.start(move || {
                let settlement = settlement.clone();
                let id = id.clone();
                async move { settlement.check(&id).await }
            })
        })
    }
}
