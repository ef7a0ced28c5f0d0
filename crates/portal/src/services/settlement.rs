//! Applying observed gateway statuses to local intents.
//!
//! Every path that learns a payment's status (the browser's status request,
//! the background poller, the gateway webhook) goes through
//! [`SettlementService::observe`], so the monotonic status rule and the
//! credit-once rule live in one place.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use credits_core::{Credits, IntentId, PaymentStatus};

use crate::db::{PaymentStore, RepositoryError};
use crate::gateway::{GatewayError, GatewayPayment, PaymentGateway};
use crate::models::{PaymentIntent, Settlement};

/// Errors while observing a payment.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The gateway reported a status the portal does not know.
    #[error("unrecognised payment status: {0}")]
    UnknownStatus(String),
}

/// What observing a payment did to the local intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No intent matches the payment.
    UnknownIntent,
    /// The gateway's status string is not one we know.
    UnrecognisedStatus(String),
    /// Same status as already recorded; nothing to do.
    Unchanged(PaymentStatus),
    /// The observed status would move a terminal intent backwards.
    Regression {
        current: PaymentStatus,
        observed: PaymentStatus,
    },
    /// The new status was recorded.
    Updated(PaymentStatus),
    /// The intent is approved and settlement ran.
    Settled(Settlement),
    /// Other observers kept changing the intent; nothing was written.
    Contended,
}

/// Conditional status writes tried before giving up.
const WRITE_ATTEMPTS: usize = 3;

/// Settles approved payments into credit balances.
#[derive(Clone)]
pub struct SettlementService {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    credits_per_brl: u32,
}

impl SettlementService {
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        credits_per_brl: u32,
    ) -> Self {
        Self {
            payments,
            gateway,
            credits_per_brl,
        }
    }

    /// Fetch a payment from the gateway and apply what it says.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call or a store operation fails.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(
        &self,
        payment_id: &str,
    ) -> Result<(GatewayPayment, Observation), SettlementError> {
        let payment = self.gateway.get_payment(payment_id).await?;
        let observation = self.observe(&payment).await?;
        Ok((payment, observation))
    }

    /// One polling step: refresh and return the parsed status.
    ///
    /// # Errors
    ///
    /// Besides [`refresh`](Self::refresh) failures, an unknown status string
    /// is an error so the poller counts it as a failed attempt.
    pub async fn check(&self, payment_id: &str) -> Result<PaymentStatus, SettlementError> {
        let (payment, _) = self.refresh(payment_id).await?;
        PaymentStatus::parse(&payment.status).ok_or(SettlementError::UnknownStatus(payment.status))
    }

    /// Apply a gateway view of a payment to the matching intent.
    ///
    /// Status writes are conditional on the status the decision was made
    /// against; when another observer got there first the intent is
    /// re-read and the decision made again.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub async fn observe(&self, payment: &GatewayPayment) -> Result<Observation, SettlementError> {
        let Some(mut intent) = self.find_intent(payment).await? else {
            tracing::debug!(payment_id = %payment.id, "no intent for payment");
            return Ok(Observation::UnknownIntent);
        };

        let Some(status) = PaymentStatus::parse(&payment.status) else {
            tracing::warn!(
                payment_id = %payment.id,
                intent_id = %intent.id,
                status = %payment.status,
                "gateway reported an unrecognised status"
            );
            return Ok(Observation::UnrecognisedStatus(payment.status.clone()));
        };

        for _ in 0..WRITE_ATTEMPTS {
            if let Some(observation) = self.apply(&intent, payment, status).await? {
                return Ok(observation);
            }

            tracing::debug!(
                payment_id = %payment.id,
                intent_id = %intent.id,
                "intent changed while applying status, re-reading"
            );
            let Some(current) = self.payments.get_intent(intent.id).await? else {
                return Ok(Observation::UnknownIntent);
            };
            intent = current;
        }

        tracing::warn!(
            payment_id = %payment.id,
            intent_id = %intent.id,
            observed = %status,
            "gave up applying status under contention"
        );
        Ok(Observation::Contended)
    }

    /// One decision against a snapshot of the intent. `None` when the
    /// snapshot was stale and nothing was written.
    async fn apply(
        &self,
        intent: &PaymentIntent,
        payment: &GatewayPayment,
        status: PaymentStatus,
    ) -> Result<Option<Observation>, SettlementError> {
        let recorded = intent.payment_id.as_deref();
        let new_attempt = recorded.is_some_and(|id| id != payment.id)
            && intent.status.allows_new_attempt();
        let changed = status != intent.status;

        if changed && !new_attempt && !intent.status.can_transition_to(status) {
            tracing::warn!(
                payment_id = %payment.id,
                intent_id = %intent.id,
                current = %intent.status,
                observed = %status,
                "ignoring status regression"
            );
            return Ok(Some(Observation::Regression {
                current: intent.status,
                observed: status,
            }));
        }

        if changed || recorded != Some(payment.id.as_str()) {
            let written = self
                .payments
                .update_status(intent.id, intent.status, &payment.id, status)
                .await?;
            if !written {
                return Ok(None);
            }
            tracing::info!(
                payment_id = %payment.id,
                intent_id = %intent.id,
                from = %intent.status,
                to = %status,
                new_attempt,
                "payment status updated"
            );
        }

        if status == PaymentStatus::Approved && !intent.is_settled() {
            let settlement = self.settle(intent).await?;
            return Ok(Some(Observation::Settled(settlement)));
        }

        Ok(Some(if changed {
            Observation::Updated(status)
        } else {
            Observation::Unchanged(status)
        }))
    }

    async fn settle(&self, intent: &PaymentIntent) -> Result<Settlement, SettlementError> {
        let credits = Credits::for_purchase(intent.amount, self.credits_per_brl);
        let settlement = self.payments.settle(intent.id, credits).await?;

        match settlement {
            Settlement::Credited {
                user_id,
                credits,
                balance,
            } => tracing::info!(
                intent_id = %intent.id,
                user_id = %user_id,
                credits = %credits,
                balance = %balance,
                "credits granted"
            ),
            Settlement::Anonymous => tracing::warn!(
                intent_id = %intent.id,
                amount = %intent.amount,
                "approved payment has no owner; nothing credited"
            ),
            Settlement::AlreadySettled => {
                tracing::debug!(intent_id = %intent.id, "intent already settled");
            }
        }

        Ok(settlement)
    }

    /// The external reference is our intent id; card payments are only
    /// reachable that way on their first observation.
    async fn find_intent(
        &self,
        payment: &GatewayPayment,
    ) -> Result<Option<PaymentIntent>, RepositoryError> {
        let by_reference = payment
            .external_reference
            .as_deref()
            .and_then(|r| Uuid::parse_str(r).ok())
            .map(IntentId::from_uuid);

        if let Some(id) = by_reference
            && let Some(intent) = self.payments.get_intent(id).await?
        {
            return Ok(Some(intent));
        }

        self.payments.get_intent_by_payment_id(&payment.id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use credits_core::{PaymentMethod, RechargeAmount, UserId};

    use super::*;
    use crate::db::MemoryPaymentStore;
    use crate::gateway::{CardCheckout, CardCheckoutRequest, PixCharge, PixPaymentRequest};
    use crate::models::{GatewayRefs, LedgerEntry, NewIntent};

    /// Gateway whose `get_payment` answers from a settable status.
    struct StubGateway {
        status: Mutex<String>,
        reference: Option<String>,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_pix_payment(
            &self,
            _request: &PixPaymentRequest,
        ) -> Result<PixCharge, GatewayError> {
            Err(GatewayError::Parse("unused".to_string()))
        }

        async fn create_card_checkout(
            &self,
            _request: &CardCheckoutRequest,
        ) -> Result<CardCheckout, GatewayError> {
            Err(GatewayError::Parse("unused".to_string()))
        }

        async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
            Ok(GatewayPayment {
                id: payment_id.to_string(),
                status: self.status.lock().unwrap().clone(),
                external_reference: self.reference.clone(),
            })
        }
    }

    async fn setup(
        user_id: Option<UserId>,
    ) -> (SettlementService, Arc<MemoryPaymentStore>, Arc<StubGateway>, IntentId) {
        let store = Arc::new(MemoryPaymentStore::new());
        let id = IntentId::generate();
        store
            .create_intent(&NewIntent {
                id,
                user_id,
                amount: RechargeAmount::new(Decimal::from_str("25").unwrap()).unwrap(),
                method: PaymentMethod::Pix,
            })
            .await
            .unwrap();
        store
            .attach_gateway_refs(
                id,
                &GatewayRefs {
                    payment_id: Some("123".to_string()),
                    ..GatewayRefs::default()
                },
            )
            .await
            .unwrap();

        let gateway = Arc::new(StubGateway {
            status: Mutex::new("pending".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway.clone(), 10);
        (service, store, gateway, id)
    }

    fn set_status(gateway: &StubGateway, status: &str) {
        *gateway.status.lock().unwrap() = status.to_string();
    }

    #[tokio::test]
    async fn test_pending_is_unchanged() {
        let (service, _, _, _) = setup(Some(UserId::new(1))).await;
        let (_, observation) = service.refresh("123").await.unwrap();
        assert_eq!(observation, Observation::Unchanged(PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn test_approved_credits_once() {
        let (service, store, gateway, id) = setup(Some(UserId::new(1))).await;
        set_status(&gateway, "approved");

        let (_, first) = service.refresh("123").await.unwrap();
        assert_eq!(
            first,
            Observation::Settled(Settlement::Credited {
                user_id: UserId::new(1),
                credits: Credits::new(250),
                balance: Credits::new(250),
            })
        );

        let (_, second) = service.refresh("123").await.unwrap();
        assert_eq!(second, Observation::Unchanged(PaymentStatus::Approved));

        assert_eq!(store.balance(UserId::new(1)).await.unwrap(), Credits::new(250));
        assert!(store.get_intent(id).await.unwrap().unwrap().is_settled());
    }

    #[tokio::test]
    async fn test_terminal_status_does_not_regress() {
        let (service, store, gateway, id) = setup(Some(UserId::new(1))).await;
        set_status(&gateway, "rejected");
        service.refresh("123").await.unwrap();

        set_status(&gateway, "pending");
        let (_, observation) = service.refresh("123").await.unwrap();

        assert_eq!(
            observation,
            Observation::Regression {
                current: PaymentStatus::Rejected,
                observed: PaymentStatus::Pending,
            }
        );
        let intent = store.get_intent(id).await.unwrap().unwrap();
        assert_eq!(intent.status, PaymentStatus::Rejected);
    }

    #[tokio::test]
    async fn test_anonymous_intent_is_settled_without_credit() {
        let (service, store, gateway, id) = setup(None).await;
        set_status(&gateway, "approved");

        let (_, observation) = service.refresh("123").await.unwrap();

        assert_eq!(observation, Observation::Settled(Settlement::Anonymous));
        assert!(store.get_intent(id).await.unwrap().unwrap().is_settled());
    }

    #[tokio::test]
    async fn test_unknown_status_fails_check() {
        let (service, _, gateway, _) = setup(Some(UserId::new(1))).await;
        set_status(&gateway, "mystery");

        let (_, observation) = service.refresh("123").await.unwrap();
        assert_eq!(
            observation,
            Observation::UnrecognisedStatus("mystery".to_string())
        );
        assert!(matches!(
            service.check("123").await,
            Err(SettlementError::UnknownStatus(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_payment_is_reported() {
        let store = Arc::new(MemoryPaymentStore::new());
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("approved".to_string()),
            reference: None,
        });
        let service = SettlementService::new(store, gateway, 10);

        let (_, observation) = service.refresh("999").await.unwrap();
        assert_eq!(observation, Observation::UnknownIntent);
    }

    #[tokio::test]
    async fn test_card_intent_found_by_reference_records_payment_id() {
        let store = Arc::new(MemoryPaymentStore::new());
        let id = IntentId::generate();
        store
            .create_intent(&NewIntent {
                id,
                user_id: Some(UserId::new(7)),
                amount: RechargeAmount::new(Decimal::from_str("10").unwrap()).unwrap(),
                method: PaymentMethod::Card,
            })
            .await
            .unwrap();
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("in_process".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway, 10);

        let (_, observation) = service.refresh("555").await.unwrap();

        assert_eq!(observation, Observation::Updated(PaymentStatus::InProcess));
        let intent = store.get_intent_by_payment_id("555").await.unwrap().unwrap();
        assert_eq!(intent.id, id);
    }

    async fn card_intent(store: &MemoryPaymentStore, user_id: UserId) -> IntentId {
        let id = IntentId::generate();
        store
            .create_intent(&NewIntent {
                id,
                user_id: Some(user_id),
                amount: RechargeAmount::new(Decimal::from(10)).unwrap(),
                method: PaymentMethod::Card,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_declined_card_retry_is_credited() {
        let store = Arc::new(MemoryPaymentStore::new());
        let user_id = UserId::new(3);
        let id = card_intent(&store, user_id).await;
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("rejected".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway.clone(), 10);

        let (_, first) = service.refresh("A").await.unwrap();
        assert_eq!(first, Observation::Updated(PaymentStatus::Rejected));

        // Second payment on the same checkout.
        set_status(&gateway, "approved");
        let (_, second) = service.refresh("B").await.unwrap();
        assert_eq!(
            second,
            Observation::Settled(Settlement::Credited {
                user_id,
                credits: Credits::new(100),
                balance: Credits::new(100),
            })
        );

        // A late read of the declined payment changes nothing.
        set_status(&gateway, "rejected");
        let (_, late) = service.refresh("A").await.unwrap();
        assert_eq!(
            late,
            Observation::Regression {
                current: PaymentStatus::Approved,
                observed: PaymentStatus::Rejected,
            }
        );

        let intent = store.get_intent(id).await.unwrap().unwrap();
        assert_eq!(intent.status, PaymentStatus::Approved);
        assert_eq!(intent.payment_id.as_deref(), Some("B"));
        assert_eq!(store.balance(user_id).await.unwrap(), Credits::new(100));
    }

    #[tokio::test]
    async fn test_same_payment_stays_rejected() {
        let store = Arc::new(MemoryPaymentStore::new());
        let id = card_intent(&store, UserId::new(3)).await;
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("rejected".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway.clone(), 10);

        service.refresh("A").await.unwrap();
        set_status(&gateway, "approved");
        let (_, observation) = service.refresh("A").await.unwrap();

        assert_eq!(
            observation,
            Observation::Regression {
                current: PaymentStatus::Rejected,
                observed: PaymentStatus::Approved,
            }
        );
        assert_eq!(store.balance(UserId::new(3)).await.unwrap(), Credits::ZERO);
    }

    /// Store whose next `get_intent` returns an out-of-date snapshot, as
    /// seen by an observer that read before a concurrent write.
    struct StaleRead {
        inner: MemoryPaymentStore,
        stale: Mutex<Option<PaymentIntent>>,
    }

    #[async_trait]
    impl PaymentStore for StaleRead {
        async fn create_intent(&self, intent: &NewIntent) -> Result<PaymentIntent, RepositoryError> {
            self.inner.create_intent(intent).await
        }

        async fn attach_gateway_refs(
            &self,
            id: IntentId,
            refs: &GatewayRefs,
        ) -> Result<(), RepositoryError> {
            self.inner.attach_gateway_refs(id, refs).await
        }

        async fn get_intent(&self, id: IntentId) -> Result<Option<PaymentIntent>, RepositoryError> {
            let stale = self.stale.lock().unwrap().take();
            match stale {
                Some(intent) => Ok(Some(intent)),
                None => self.inner.get_intent(id).await,
            }
        }

        async fn get_intent_by_payment_id(
            &self,
            payment_id: &str,
        ) -> Result<Option<PaymentIntent>, RepositoryError> {
            self.inner.get_intent_by_payment_id(payment_id).await
        }

        async fn update_status(
            &self,
            id: IntentId,
            expected: PaymentStatus,
            payment_id: &str,
            status: PaymentStatus,
        ) -> Result<bool, RepositoryError> {
            self.inner
                .update_status(id, expected, payment_id, status)
                .await
        }

        async fn settle(&self, id: IntentId, credits: Credits) -> Result<Settlement, RepositoryError> {
            self.inner.settle(id, credits).await
        }

        async fn balance(&self, user_id: UserId) -> Result<Credits, RepositoryError> {
            self.inner.balance(user_id).await
        }

        async fn ledger(
            &self,
            user_id: UserId,
            limit: i64,
        ) -> Result<Vec<LedgerEntry>, RepositoryError> {
            self.inner.ledger(user_id, limit).await
        }
    }

    /// A pending PIX intent with payment id "123", and a pending snapshot
    /// of it taken before `advance` ran.
    async fn raced_intent(
        user_id: UserId,
        advance: PaymentStatus,
    ) -> (Arc<StaleRead>, IntentId) {
        let inner = MemoryPaymentStore::new();
        let id = IntentId::generate();
        inner
            .create_intent(&NewIntent {
                id,
                user_id: Some(user_id),
                amount: RechargeAmount::new(Decimal::from(20)).unwrap(),
                method: PaymentMethod::Pix,
            })
            .await
            .unwrap();
        inner
            .attach_gateway_refs(
                id,
                &GatewayRefs {
                    payment_id: Some("123".to_string()),
                    ..GatewayRefs::default()
                },
            )
            .await
            .unwrap();
        let snapshot = inner.get_intent(id).await.unwrap();

        assert!(
            inner
                .update_status(id, PaymentStatus::Pending, "123", advance)
                .await
                .unwrap()
        );
        if advance == PaymentStatus::Approved {
            inner.settle(id, Credits::new(200)).await.unwrap();
        }

        let store = Arc::new(StaleRead {
            inner,
            stale: Mutex::new(snapshot),
        });
        (store, id)
    }

    #[tokio::test]
    async fn test_stale_observer_cannot_reopen_settled_intent() {
        let user_id = UserId::new(4);
        let (store, id) = raced_intent(user_id, PaymentStatus::Approved).await;
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("in_process".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway, 10);

        let (_, observation) = service.refresh("123").await.unwrap();

        assert_eq!(
            observation,
            Observation::Regression {
                current: PaymentStatus::Approved,
                observed: PaymentStatus::InProcess,
            }
        );
        let intent = store.get_intent(id).await.unwrap().unwrap();
        assert_eq!(intent.status, PaymentStatus::Approved);
        assert!(intent.is_settled());
        assert_eq!(store.balance(user_id).await.unwrap(), Credits::new(200));
    }

    #[tokio::test]
    async fn test_lost_write_is_retried_against_fresh_intent() {
        let user_id = UserId::new(5);
        let (store, id) = raced_intent(user_id, PaymentStatus::InProcess).await;
        let gateway = Arc::new(StubGateway {
            status: Mutex::new("approved".to_string()),
            reference: Some(id.to_string()),
        });
        let service = SettlementService::new(store.clone(), gateway, 10);

        let (_, observation) = service.refresh("123").await.unwrap();

        assert!(matches!(
            observation,
            Observation::Settled(Settlement::Credited { .. })
        ));
        assert_eq!(store.balance(user_id).await.unwrap(), Credits::new(200));
    }
}
