//! Payment intent and credit ledger repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use credits_core::{
    Credits, IntentId, LedgerEntryId, PaymentMethod, PaymentStatus, RechargeAmount, UserId,
};

use super::{PaymentStore, RepositoryError, conflict_on_unique};
use crate::models::{
    GatewayRefs, LedgerEntry, LedgerKind, NewIntent, PaymentIntent, Settlement,
};

const INTENT_COLUMNS: &str = "id, user_id, amount, method, status, payment_id, preference_id, \
     qr_base64, qr_code, expires_at, redirect_url, created_at, updated_at, credited_at";

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: Uuid,
    user_id: Option<i64>,
    amount: Decimal,
    method: String,
    status: String,
    payment_id: Option<String>,
    preference_id: Option<String>,
    qr_base64: Option<String>,
    qr_code: Option<String>,
    expires_at: Option<String>,
    redirect_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    credited_at: Option<DateTime<Utc>>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = RepositoryError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        let amount = RechargeAmount::new(row.amount).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid amount in database: {e}"))
        })?;
        let method: PaymentMethod = row.method.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid method in database: {e}"))
        })?;
        let status = PaymentStatus::parse(&row.status).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("invalid status in database: {}", row.status))
        })?;

        Ok(Self {
            id: IntentId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::new),
            amount,
            method,
            status,
            payment_id: row.payment_id,
            preference_id: row.preference_id,
            qr_base64: row.qr_base64,
            qr_code: row.qr_code,
            expires_at: row.expires_at,
            redirect_url: row.redirect_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            credited_at: row.credited_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    user_id: i64,
    kind: String,
    credits: i64,
    intent_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = RepositoryError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let kind = LedgerKind::parse(&row.kind).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("invalid ledger kind: {}", row.kind))
        })?;

        Ok(Self {
            id: LedgerEntryId::new(row.id),
            user_id: UserId::new(row.user_id),
            kind,
            credits: Credits::new(row.credits),
            intent_id: row.intent_id.map(IntentId::from_uuid),
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed [`PaymentStore`].
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentRepository {
    async fn create_intent(&self, intent: &NewIntent) -> Result<PaymentIntent, RepositoryError> {
        let row: IntentRow = sqlx::query_as(&format!(
            r"
            INSERT INTO payment_intents (id, user_id, amount, method, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {INTENT_COLUMNS}
            "
        ))
        .bind(intent.id.as_uuid())
        .bind(intent.user_id.map(|id| id.as_i64()))
        .bind(intent.amount.value())
        .bind(intent.method.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "intent"))?;

        PaymentIntent::try_from(row)
    }

    async fn attach_gateway_refs(
        &self,
        id: IntentId,
        refs: &GatewayRefs,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE payment_intents
            SET payment_id = COALESCE($2, payment_id),
                preference_id = COALESCE($3, preference_id),
                qr_base64 = $4,
                qr_code = $5,
                expires_at = $6,
                redirect_url = $7,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(refs.payment_id.as_deref())
        .bind(refs.preference_id.as_deref())
        .bind(refs.qr_base64.as_deref())
        .bind(refs.qr_code.as_deref())
        .bind(refs.expires_at.as_deref())
        .bind(refs.redirect_url.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_intent(&self, id: IntentId) -> Result<Option<PaymentIntent>, RepositoryError> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentIntent::try_from).transpose()
    }

    async fn get_intent_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentIntent>, RepositoryError> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentIntent::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: IntentId,
        expected: PaymentStatus,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE payment_intents
            SET status = $3, payment_id = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn settle(&self, id: IntentId, credits: Credits) -> Result<Settlement, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The conditional update is the only guard against double crediting.
        let owner: Option<Option<i64>> = sqlx::query_scalar(
            r"
            UPDATE payment_intents
            SET credited_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'approved' AND credited_at IS NULL
            RETURNING user_id
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let user_id = match owner {
            None => return Ok(Settlement::AlreadySettled),
            Some(None) => {
                tx.commit().await?;
                return Ok(Settlement::Anonymous);
            }
            Some(Some(user_id)) => user_id,
        };

        sqlx::query(
            r"
            INSERT INTO credit_ledger (user_id, kind, credits, intent_id)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(user_id)
        .bind(LedgerKind::Purchase.as_str())
        .bind(credits.get())
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let balance: i64 = sqlx::query_scalar(
            r"
            INSERT INTO credit_balances (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET balance = credit_balances.balance + EXCLUDED.balance,
                          updated_at = NOW()
            RETURNING balance
            ",
        )
        .bind(user_id)
        .bind(credits.get())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Settlement::Credited {
            user_id: UserId::new(user_id),
            credits,
            balance: Credits::new(balance),
        })
    }

    async fn balance(&self, user_id: UserId) -> Result<Credits, RepositoryError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM credit_balances WHERE user_id = $1")
                .bind(user_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        Ok(balance.map_or(Credits::ZERO, Credits::new))
    }

    async fn ledger(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r"
            SELECT id, user_id, kind, credits, intent_id, created_at
            FROM credit_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(user_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
