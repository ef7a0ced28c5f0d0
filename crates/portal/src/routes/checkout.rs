//! Checkout route handler.

use axum::{Json, body::Bytes, extract::State};
use serde_json::Value;

use crate::error::add_breadcrumb;
use crate::middleware::OptionalAuth;
use crate::services::{CheckoutCommand, CheckoutError, CheckoutResponse};
use crate::state::AppState;

/// Start a recharge or read a payment's status.
///
/// Signed-in users get their intent linked to their account; anonymous
/// checkouts are allowed but never credited.
///
/// A created PIX charge also starts a background poller that settles the
/// payment once approved, independently of the browser polling.
///
/// # Route
///
/// `POST /api/checkout`
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn checkout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, CheckoutError> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| CheckoutError::InvalidBody)?;
    let command = CheckoutCommand::parse(&body)?;

    let checkout = state.checkout().ok_or(CheckoutError::MissingToken)?;

    match command {
        CheckoutCommand::Status { payment_id } => checkout.status(&payment_id).await.map(Json),
        CheckoutCommand::Create { amount, method } => {
            let response = checkout.create(user.as_ref(), amount, method).await?;

            if let CheckoutResponse::Pix { payment_id, .. } = &response {
                add_breadcrumb(
                    "checkout",
                    "PIX charge created",
                    Some(&[("payment_id", payment_id.as_str())]),
                );
                if !state.watch_payment(payment_id) {
                    tracing::debug!(payment_id = %payment_id, "payment already watched");
                }
            }

            Ok(Json(response))
        }
    }
}
