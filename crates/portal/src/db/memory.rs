//! In-memory stores for tests and local development without Postgres.
//!
//! Same contracts as the Postgres repositories: unique emails, unique
//! OAuth links and at-most-once settlement.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use credits_core::{Credits, Email, IntentId, LedgerEntryId, PaymentStatus, UserId};

use super::{PaymentStore, RepositoryError, UserStore};
use crate::models::{
    GatewayRefs, LedgerEntry, LedgerKind, NewIntent, NewUser, OAuthAccount, PaymentIntent,
    Settlement, User,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Users {
    next_id: i64,
    rows: Vec<(User, Option<String>)>,
    links: HashMap<(String, String), UserId>,
}

impl Users {
    fn insert(&mut self, user: &NewUser) -> Result<User, RepositoryError> {
        if self.rows.iter().any(|(u, _)| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        self.next_id += 1;
        let created = User {
            id: UserId::new(self.next_id),
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
            created_at: Utc::now(),
        };
        self.rows.push((created.clone(), user.password_hash.clone()));
        Ok(created)
    }
}

/// Mutex-guarded [`UserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Users>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).rows.len()
    }

    /// Whether the store has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.inner)
            .rows
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone()))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.inner)
            .rows
            .iter()
            .find(|(u, _)| &u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(lock(&self.inner)
            .rows
            .iter()
            .find(|(u, _)| &u.email == email)
            .and_then(|(u, hash)| hash.clone().map(|h| (u.clone(), h))))
    }

    async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        lock(&self.inner).insert(user)
    }

    async fn get_by_oauth(&self, account: &OAuthAccount) -> Result<Option<User>, RepositoryError> {
        let users = lock(&self.inner);
        let key = (
            account.provider.clone(),
            account.provider_account_id.clone(),
        );
        let Some(id) = users.links.get(&key).copied() else {
            return Ok(None);
        };
        Ok(users
            .rows
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone()))
    }

    async fn create_with_oauth(
        &self,
        user: &NewUser,
        account: &OAuthAccount,
    ) -> Result<User, RepositoryError> {
        let mut users = lock(&self.inner);
        let key = (
            account.provider.clone(),
            account.provider_account_id.clone(),
        );
        if users.links.contains_key(&key) {
            return Err(RepositoryError::Conflict(
                "oauth account already exists".to_owned(),
            ));
        }
        let created = users.insert(user)?;
        users.links.insert(key, created.id);
        Ok(created)
    }
}

#[derive(Default)]
struct Payments {
    intents: HashMap<IntentId, PaymentIntent>,
    ledger: Vec<LedgerEntry>,
    balances: HashMap<UserId, Credits>,
}

/// Mutex-guarded [`PaymentStore`].
#[derive(Default)]
pub struct MemoryPaymentStore {
    inner: Mutex<Payments>,
}

impl MemoryPaymentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intents.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        lock(&self.inner).intents.len()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn create_intent(&self, intent: &NewIntent) -> Result<PaymentIntent, RepositoryError> {
        let mut payments = lock(&self.inner);
        if payments.intents.contains_key(&intent.id) {
            return Err(RepositoryError::Conflict("intent already exists".to_owned()));
        }
        let now = Utc::now();
        let created = PaymentIntent {
            id: intent.id,
            user_id: intent.user_id,
            amount: intent.amount,
            method: intent.method,
            status: PaymentStatus::Pending,
            payment_id: None,
            preference_id: None,
            qr_base64: None,
            qr_code: None,
            expires_at: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
            credited_at: None,
        };
        payments.intents.insert(intent.id, created.clone());
        Ok(created)
    }

    async fn attach_gateway_refs(
        &self,
        id: IntentId,
        refs: &GatewayRefs,
    ) -> Result<(), RepositoryError> {
        let mut payments = lock(&self.inner);
        let intent = payments
            .intents
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if refs.payment_id.is_some() {
            intent.payment_id.clone_from(&refs.payment_id);
        }
        if refs.preference_id.is_some() {
            intent.preference_id.clone_from(&refs.preference_id);
        }
        intent.qr_base64.clone_from(&refs.qr_base64);
        intent.qr_code.clone_from(&refs.qr_code);
        intent.expires_at.clone_from(&refs.expires_at);
        intent.redirect_url.clone_from(&refs.redirect_url);
        intent.updated_at = Utc::now();
        Ok(())
    }

    async fn get_intent(&self, id: IntentId) -> Result<Option<PaymentIntent>, RepositoryError> {
        Ok(lock(&self.inner).intents.get(&id).cloned())
    }

    async fn get_intent_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentIntent>, RepositoryError> {
        Ok(lock(&self.inner)
            .intents
            .values()
            .find(|i| i.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: IntentId,
        expected: PaymentStatus,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, RepositoryError> {
        let mut payments = lock(&self.inner);
        let Some(intent) = payments.intents.get_mut(&id) else {
            return Ok(false);
        };
        if intent.status != expected {
            return Ok(false);
        }
        intent.status = status;
        intent.payment_id = Some(payment_id.to_owned());
        intent.updated_at = Utc::now();
        Ok(true)
    }

    async fn settle(&self, id: IntentId, credits: Credits) -> Result<Settlement, RepositoryError> {
        let mut payments = lock(&self.inner);
        let Some(intent) = payments.intents.get_mut(&id) else {
            return Ok(Settlement::AlreadySettled);
        };
        if intent.status != PaymentStatus::Approved || intent.credited_at.is_some() {
            return Ok(Settlement::AlreadySettled);
        }
        let now = Utc::now();
        intent.credited_at = Some(now);
        intent.updated_at = now;

        let Some(user_id) = intent.user_id else {
            return Ok(Settlement::Anonymous);
        };

        let next_id = i64::try_from(payments.ledger.len()).unwrap_or(i64::MAX - 1) + 1;
        payments.ledger.push(LedgerEntry {
            id: LedgerEntryId::new(next_id),
            user_id,
            kind: LedgerKind::Purchase,
            credits,
            intent_id: Some(id),
            created_at: now,
        });
        let balance = payments.balances.entry(user_id).or_insert(Credits::ZERO);
        *balance = balance.saturating_add(credits);

        Ok(Settlement::Credited {
            user_id,
            credits,
            balance: *balance,
        })
    }

    async fn balance(&self, user_id: UserId) -> Result<Credits, RepositoryError> {
        Ok(lock(&self.inner)
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(Credits::ZERO))
    }

    async fn ledger(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(lock(&self.inner)
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(take)
            .cloned()
            .collect())
    }
}
