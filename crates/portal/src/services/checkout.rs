//! Checkout: starting a recharge and reading a payment's status.
//!
//! The request body is loosely typed JSON. [`CheckoutCommand::parse`]
//! narrows it in a fixed order: the status operation first, then the
//! amount, then the method.

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use credits_core::{IntentId, PaymentMethod, RechargeAmount};

use crate::db::{PaymentStore, RepositoryError};
use crate::gateway::{
    BackUrls, CardCheckoutRequest, GatewayError, PaymentGateway, PixPaymentRequest,
};
use crate::models::{CurrentUser, GatewayRefs, NewIntent};
use crate::services::settlement::SettlementService;

/// Description shown on PIX charges.
pub const PIX_DESCRIPTION: &str = "Recarga de créditos (PIX)";
/// Line item title on hosted checkouts.
pub const CARD_ITEM_TITLE: &str = "Recarga de créditos";
/// Payer email used when nobody is signed in.
pub const PLACEHOLDER_PAYER_EMAIL: &str = "pagador@example.com";

/// Checkout failures, each mapped to a short machine-readable tag.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("request body is not valid JSON")]
    InvalidBody,

    #[error("amount missing or below the minimum")]
    InvalidAmount,

    #[error("payment method must be pix or card")]
    InvalidMethod,

    /// No gateway access token is configured.
    #[error("payment gateway not configured")]
    MissingToken,

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Tag returned to the client.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::InvalidBody => "invalid-body",
            Self::InvalidAmount => "invalid-amount",
            Self::InvalidMethod => "invalid-method",
            Self::MissingToken => "mp-missing-token",
            Self::Gateway(_) | Self::Repository(_) => "checkout-failed",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody | Self::InvalidAmount | Self::InvalidMethod => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingToken => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(_) | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        match &self {
            Self::Gateway(_) | Self::Repository(_) => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(error = %self, sentry_event_id = %event_id, "checkout failed");
            }
            Self::MissingToken => tracing::warn!("checkout requested without MP_ACCESS_TOKEN"),
            _ => {}
        }

        (
            self.status_code(),
            Json(json!({ "ok": false, "error": self.tag() })),
        )
            .into_response()
    }
}

/// A validated checkout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutCommand {
    /// Read the gateway's status for a payment.
    Status { payment_id: String },
    /// Start a recharge.
    Create {
        amount: RechargeAmount,
        method: PaymentMethod,
    },
}

impl CheckoutCommand {
    /// Narrow a request body.
    ///
    /// `{op: "status", paymentId}` is a status request only when the id is
    /// present and truthy (non-empty string or non-zero number); otherwise
    /// the body is treated as a recharge.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` or `InvalidMethod`.
    pub fn parse(body: &Value) -> Result<Self, CheckoutError> {
        if body.get("op").and_then(Value::as_str) == Some("status")
            && let Some(payment_id) = body.get("paymentId").and_then(truthy_id)
        {
            return Ok(Self::Status { payment_id });
        }

        let amount =
            RechargeAmount::from_json(body.get("amount")).map_err(|_| CheckoutError::InvalidAmount)?;
        let method = body
            .get("method")
            .and_then(Value::as_str)
            .and_then(|m| m.parse::<PaymentMethod>().ok())
            .ok_or(CheckoutError::InvalidMethod)?;

        Ok(Self::Create { amount, method })
    }
}

fn truthy_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Successful checkout responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CheckoutResponse {
    Pix {
        ok: bool,
        method: PaymentMethod,
        #[serde(rename = "paymentId")]
        payment_id: String,
        qr_base64: Option<String>,
        qr_code: Option<String>,
        expires_at: Option<String>,
    },
    Card {
        ok: bool,
        method: PaymentMethod,
        #[serde(rename = "initPoint")]
        init_point: String,
        #[serde(rename = "preferenceId")]
        preference_id: String,
    },
    Status {
        ok: bool,
        status: String,
    },
}

/// Starts recharges against the payment gateway.
#[derive(Clone)]
pub struct CheckoutService {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    settlement: SettlementService,
    base_url: String,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        settlement: SettlementService,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            payments,
            gateway,
            settlement,
            base_url: base_url.into(),
        }
    }

    /// Create a PIX charge or a hosted card checkout.
    ///
    /// The intent is recorded before the gateway is called so that a
    /// notification arriving early still finds it.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the intent cannot be recorded and `Gateway`
    /// if the gateway call fails.
    #[tracing::instrument(skip(self, user), fields(user_id = user.map(|u| u.id.as_i64())))]
    pub async fn create(
        &self,
        user: Option<&CurrentUser>,
        amount: RechargeAmount,
        method: PaymentMethod,
    ) -> Result<CheckoutResponse, CheckoutError> {
        let intent_id = IntentId::generate();
        self.payments
            .create_intent(&NewIntent {
                id: intent_id,
                user_id: user.map(|u| u.id),
                amount,
                method,
            })
            .await?;

        let (response, refs) = match method {
            PaymentMethod::Pix => self.create_pix(user, intent_id, amount).await?,
            PaymentMethod::Card => self.create_card(intent_id, amount).await?,
        };

        // The charge exists on the gateway; a failure here must not hide it
        // from the client. The webhook still finds the intent by reference.
        if let Err(e) = self.payments.attach_gateway_refs(intent_id, &refs).await {
            tracing::error!(intent_id = %intent_id, error = %e, "failed to attach gateway refs");
        }

        tracing::info!(intent_id = %intent_id, "checkout created");
        Ok(response)
    }

    /// Current gateway status of a payment, unmapped.
    ///
    /// The status is also applied to the local intent. Failures there are
    /// logged and do not affect the answer.
    ///
    /// # Errors
    ///
    /// Returns `Gateway` if the gateway call fails.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, payment_id: &str) -> Result<CheckoutResponse, CheckoutError> {
        let payment = self.gateway.get_payment(payment_id).await?;

        if let Err(e) = self.settlement.observe(&payment).await {
            tracing::error!(payment_id = %payment.id, error = %e, "failed to apply observed status");
        }

        Ok(CheckoutResponse::Status {
            ok: true,
            status: payment.status,
        })
    }

    async fn create_pix(
        &self,
        user: Option<&CurrentUser>,
        intent_id: IntentId,
        amount: RechargeAmount,
    ) -> Result<(CheckoutResponse, GatewayRefs), CheckoutError> {
        let payer_email = user.map_or_else(
            || PLACEHOLDER_PAYER_EMAIL.to_string(),
            |u| u.email.to_string(),
        );

        let charge = self
            .gateway
            .create_pix_payment(&PixPaymentRequest {
                amount,
                description: PIX_DESCRIPTION.to_string(),
                payer_email,
                external_reference: intent_id,
                idempotency_key: intent_id.to_string(),
                notification_url: self.notification_url(),
            })
            .await?;

        let refs = GatewayRefs {
            payment_id: Some(charge.payment_id.clone()),
            qr_base64: charge.qr_base64.clone(),
            qr_code: charge.qr_code.clone(),
            expires_at: charge.expires_at.clone(),
            ..GatewayRefs::default()
        };

        Ok((
            CheckoutResponse::Pix {
                ok: true,
                method: PaymentMethod::Pix,
                payment_id: charge.payment_id,
                qr_base64: charge.qr_base64,
                qr_code: charge.qr_code,
                expires_at: charge.expires_at,
            },
            refs,
        ))
    }

    async fn create_card(
        &self,
        intent_id: IntentId,
        amount: RechargeAmount,
    ) -> Result<(CheckoutResponse, GatewayRefs), CheckoutError> {
        let checkout = self
            .gateway
            .create_card_checkout(&CardCheckoutRequest {
                amount,
                title: CARD_ITEM_TITLE.to_string(),
                back_urls: self.back_urls(),
                external_reference: intent_id,
                idempotency_key: intent_id.to_string(),
                notification_url: self.notification_url(),
            })
            .await?;

        let refs = GatewayRefs {
            preference_id: Some(checkout.preference_id.clone()),
            redirect_url: Some(checkout.init_point.clone()),
            ..GatewayRefs::default()
        };

        Ok((
            CheckoutResponse::Card {
                ok: true,
                method: PaymentMethod::Card,
                init_point: checkout.init_point,
                preference_id: checkout.preference_id,
            },
            refs,
        ))
    }

    fn back_urls(&self) -> BackUrls {
        BackUrls {
            success: format!("{}/portal?paid=1", self.base_url),
            pending: format!("{}/portal?paid=pending", self.base_url),
            failure: format!("{}/portal?paid=0", self.base_url),
        }
    }

    /// The gateway only delivers notifications to public https endpoints.
    fn notification_url(&self) -> Option<String> {
        self.base_url
            .starts_with("https://")
            .then(|| format!("{}/api/webhooks/mercadopago", self.base_url))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_status_op_takes_precedence() {
        let cmd = CheckoutCommand::parse(&json!({ "op": "status", "paymentId": 123, "amount": 1 }))
            .unwrap();
        assert_eq!(
            cmd,
            CheckoutCommand::Status {
                payment_id: "123".to_string()
            }
        );

        let cmd = CheckoutCommand::parse(&json!({ "op": "status", "paymentId": "abc" })).unwrap();
        assert_eq!(
            cmd,
            CheckoutCommand::Status {
                payment_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_status_op_without_id_falls_through() {
        for body in [
            json!({ "op": "status" }),
            json!({ "op": "status", "paymentId": "" }),
            json!({ "op": "status", "paymentId": 0 }),
            json!({ "op": "status", "paymentId": null }),
        ] {
            assert!(
                matches!(
                    CheckoutCommand::parse(&body),
                    Err(CheckoutError::InvalidAmount)
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn test_amount_checked_before_method() {
        let err = CheckoutCommand::parse(&json!({ "amount": 5, "method": "boleto" })).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidAmount));

        let err = CheckoutCommand::parse(&json!({ "amount": 50, "method": "boleto" })).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidMethod));

        let err = CheckoutCommand::parse(&json!({ "amount": 50 })).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidMethod));
    }

    #[test]
    fn test_create_command() {
        let cmd = CheckoutCommand::parse(&json!({ "amount": "9.99", "method": "card" })).unwrap();
        assert_eq!(
            cmd,
            CheckoutCommand::Create {
                amount: RechargeAmount::new(Decimal::from_str("9.99").unwrap()).unwrap(),
                method: PaymentMethod::Card,
            }
        );
    }

    #[test]
    fn test_error_tags_and_codes() {
        assert_eq!(CheckoutError::InvalidAmount.tag(), "invalid-amount");
        assert_eq!(
            CheckoutError::MissingToken.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let err = CheckoutError::Gateway(GatewayError::Parse("x".to_string()));
        assert_eq!(err.tag(), "checkout-failed");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_pix_response_shape() {
        let response = CheckoutResponse::Pix {
            ok: true,
            method: PaymentMethod::Pix,
            payment_id: "42".to_string(),
            qr_base64: None,
            qr_code: Some("000201".to_string()),
            expires_at: None,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "ok": true,
                "method": "pix",
                "paymentId": "42",
                "qr_base64": null,
                "qr_code": "000201",
                "expires_at": null
            })
        );
    }

    #[test]
    fn test_card_response_shape() {
        let response = CheckoutResponse::Card {
            ok: true,
            method: PaymentMethod::Card,
            init_point: "https://mp.test/init".to_string(),
            preference_id: "pref-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "ok": true,
                "method": "card",
                "initPoint": "https://mp.test/init",
                "preferenceId": "pref-1"
            })
        );
    }
}
