//! Payment gateway boundary.
//!
//! Handlers and services only see the narrowed types in this module. The
//! Mercado Pago wire format stays inside [`mercadopago`].

pub mod mercadopago;

use async_trait::async_trait;
use thiserror::Error;

use credits_core::{IntentId, RechargeAmount};

pub use mercadopago::MercadoPagoClient;

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A field the portal relies on was absent from the response.
    #[error("missing field in gateway response: {0}")]
    MissingField(&'static str),
}

/// A PIX charge to create.
#[derive(Debug, Clone)]
pub struct PixPaymentRequest {
    pub amount: RechargeAmount,
    pub description: String,
    pub payer_email: String,
    /// Our intent id, echoed back by the gateway on every read.
    pub external_reference: IntentId,
    pub idempotency_key: String,
    /// Where the gateway posts status notifications.
    pub notification_url: Option<String>,
}

/// Redirect targets after a hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

/// A hosted card checkout to create.
#[derive(Debug, Clone)]
pub struct CardCheckoutRequest {
    pub amount: RechargeAmount,
    pub title: String,
    pub back_urls: BackUrls,
    pub external_reference: IntentId,
    pub idempotency_key: String,
    pub notification_url: Option<String>,
}

/// A created PIX payment.
///
/// QR fields are passed through as the gateway returned them; any of them
/// may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixCharge {
    pub payment_id: String,
    pub status: Option<String>,
    pub qr_base64: Option<String>,
    pub qr_code: Option<String>,
    pub expires_at: Option<String>,
}

/// A created hosted checkout preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCheckout {
    pub preference_id: String,
    pub init_point: String,
}

/// Current view of a payment on the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayment {
    pub id: String,
    /// Raw status string, unmapped.
    pub status: String,
    pub external_reference: Option<String>,
}

/// Operations the portal needs from a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a PIX payment and return its QR data.
    async fn create_pix_payment(&self, request: &PixPaymentRequest)
    -> Result<PixCharge, GatewayError>;

    /// Create a hosted card checkout and return its redirect URL.
    async fn create_card_checkout(
        &self,
        request: &CardCheckoutRequest,
    ) -> Result<CardCheckout, GatewayError>;

    /// Fetch the current state of a payment.
    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}
