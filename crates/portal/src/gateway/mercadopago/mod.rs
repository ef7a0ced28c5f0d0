//! Mercado Pago REST client.
//!
//! # Endpoints
//!
//! - `POST /v1/payments` - create a PIX payment
//! - `POST /checkout/preferences` - create a hosted checkout (card)
//! - `GET /v1/payments/{id}` - read a payment's status
//!
//! Create calls carry an `X-Idempotency-Key`, so retrying the same intent
//! never produces a second charge.

mod types;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use super::{
    CardCheckout, CardCheckoutRequest, GatewayError, GatewayPayment, PaymentGateway, PixCharge,
    PixPaymentRequest,
};
use crate::config::GatewayConfig;
use types::{
    CreatePaymentBody, CreatePreferenceBody, Payer, PaymentResponse, PreferenceBackUrls,
    PreferenceItem, PreferenceResponse,
};

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Mercado Pago API client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: reqwest::Client,
    base_url: String,
}

impl MercadoPagoClient {
    /// Create a new client authenticated with the configured access token.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.access_token.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| GatewayError::Parse(format!("Invalid access token format: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Turn a gateway response into `T`, or an `Api` error for non-2xx.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Parse(e.to_string()))
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    #[tracing::instrument(skip(self, request), fields(intent_id = %request.external_reference))]
    async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest,
    ) -> Result<PixCharge, GatewayError> {
        let body = CreatePaymentBody {
            transaction_amount: request.amount.value(),
            description: &request.description,
            payment_method_id: "pix",
            payer: Payer {
                email: &request.payer_email,
            },
            external_reference: request.external_reference.to_string(),
            notification_url: request.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/v1/payments"))
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let payment: PaymentResponse = read_json(response).await?;

        let payment_id = payment
            .id
            .ok_or(GatewayError::MissingField("id"))?
            .into_string();
        let data = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data);
        let (qr_base64, qr_code, qr_expiry) = match data {
            Some(d) => (d.qr_code_base64, d.qr_code, d.qr_code_expiration_date),
            None => (None, None, None),
        };

        tracing::info!(payment_id = %payment_id, "PIX payment created");

        Ok(PixCharge {
            payment_id,
            status: payment.status,
            qr_base64,
            qr_code,
            expires_at: qr_expiry,
        })
    }

    #[tracing::instrument(skip(self, request), fields(intent_id = %request.external_reference))]
    async fn create_card_checkout(
        &self,
        request: &CardCheckoutRequest,
    ) -> Result<CardCheckout, GatewayError> {
        let body = CreatePreferenceBody {
            items: vec![PreferenceItem {
                title: &request.title,
                quantity: 1,
                currency_id: "BRL",
                unit_price: request.amount.value(),
            }],
            back_urls: PreferenceBackUrls {
                success: &request.back_urls.success,
                pending: &request.back_urls.pending,
                failure: &request.back_urls.failure,
            },
            auto_return: "approved",
            external_reference: request.external_reference.to_string(),
            notification_url: request.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let preference: PreferenceResponse = read_json(response).await?;

        let preference_id = preference.id.ok_or(GatewayError::MissingField("id"))?;
        let init_point = preference
            .init_point
            .ok_or(GatewayError::MissingField("init_point"))?;

        tracing::info!(preference_id = %preference_id, "checkout preference created");

        Ok(CardCheckout {
            preference_id,
            init_point,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let url = self.url(&format!(
            "/v1/payments/{}",
            urlencoding::encode(payment_id)
        ));

        let response = self.client.get(&url).send().await?;
        let payment: PaymentResponse = read_json(response).await?;

        Ok(GatewayPayment {
            id: payment
                .id
                .map_or_else(|| payment_id.to_string(), types::WireId::into_string),
            status: payment.status.ok_or(GatewayError::MissingField("status"))?,
            external_reference: payment.external_reference,
        })
    }
}
