//! Mercado Pago REST wire types.
//!
//! Only the fields the portal reads are modelled; everything else in the
//! responses is ignored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CreatePaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    pub transaction_amount: Decimal,
    pub description: &'a str,
    pub payment_method_id: &'a str,
    pub payer: Payer<'a>,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct Payer<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreatePreferenceBody<'a> {
    pub items: Vec<PreferenceItem<'a>>,
    pub back_urls: PreferenceBackUrls<'a>,
    pub auto_return: &'a str,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem<'a> {
    pub title: &'a str,
    pub quantity: u32,
    pub currency_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PreferenceBackUrls<'a> {
    pub success: &'a str,
    pub pending: &'a str,
    pub failure: &'a str,
}

// =============================================================================
// Responses
// =============================================================================

/// Payment ids are numbers on the wire; accept strings too.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentResponse {
    pub id: Option<WireId>,
    pub status: Option<String>,
    pub external_reference: Option<String>,
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
pub struct PointOfInteraction {
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionData {
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub qr_code_expiration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceResponse {
    pub id: Option<String>,
    pub init_point: Option<String>,
}
