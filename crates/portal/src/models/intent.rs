//! Payment intent: the local record of one checkout attempt.

use chrono::{DateTime, Utc};

use credits_core::{IntentId, PaymentMethod, PaymentStatus, RechargeAmount, UserId};

/// A checkout attempt and the last gateway status observed for it.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: IntentId,
    /// Owner. Anonymous checkouts have none and are never credited.
    pub user_id: Option<UserId>,
    pub amount: RechargeAmount,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Gateway payment id. Known at creation for PIX, on first observation for card.
    pub payment_id: Option<String>,
    /// Hosted checkout preference id (card only).
    pub preference_id: Option<String>,
    /// QR code image, base64 PNG (PIX only).
    pub qr_base64: Option<String>,
    /// PIX copy-paste code.
    pub qr_code: Option<String>,
    /// QR expiry as reported by the gateway.
    pub expires_at: Option<String>,
    /// Hosted checkout URL (card only).
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, when the approved payment is credited.
    pub credited_at: Option<DateTime<Utc>>,
}

impl PaymentIntent {
    /// Whether settlement already ran for this intent.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.credited_at.is_some()
    }
}

/// Data needed to record a new intent before the gateway is called.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub id: IntentId,
    pub user_id: Option<UserId>,
    pub amount: RechargeAmount,
    pub method: PaymentMethod,
}

/// Gateway references attached to an intent once the charge exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayRefs {
    pub payment_id: Option<String>,
    pub preference_id: Option<String>,
    pub qr_base64: Option<String>,
    pub qr_code: Option<String>,
    pub expires_at: Option<String>,
    pub redirect_url: Option<String>,
}
