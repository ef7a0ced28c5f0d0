//! Payment gateway notifications.
//!
//! Mercado Pago notifies either with a JSON body
//! (`{"type": "payment", "data": {"id": "123"}}`) or with query parameters
//! (`?topic=payment&id=123`, `?type=payment&data.id=123`). The notification
//! only says *which* payment changed; its status is always re-fetched from
//! the gateway before anything is applied.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query-string form of a notification.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

/// The payment a notification refers to, if it is a payment notification.
fn payment_id(query: &NotificationQuery, body: Option<&Value>) -> Option<String> {
    let kind = body
        .and_then(|b| b.get("type"))
        .and_then(Value::as_str)
        .or(query.kind.as_deref())
        .or(query.topic.as_deref())?;
    if kind != "payment" {
        return None;
    }

    let body_id = body
        .and_then(|b| b.get("data"))
        .and_then(|d| d.get("id"))
        .and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    body_id
        .or_else(|| query.data_id.clone())
        .or_else(|| query.id.clone())
}

/// Receive a gateway notification.
///
/// Answers 200 for notifications that are not about a payment, so the
/// gateway stops retrying them, and 500 when the re-fetch fails, so it
/// retries.
///
/// # Route
///
/// `POST /api/webhooks/mercadopago`
#[tracing::instrument(skip_all)]
pub async fn mercadopago(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    body: Bytes,
) -> Result<Json<Value>> {
    let body: Option<Value> = serde_json::from_slice(&body).ok();

    let Some(payment_id) = payment_id(&query, body.as_ref()) else {
        tracing::debug!(?query, "ignoring non-payment notification");
        return Ok(Json(json!({ "ok": true, "ignored": true })));
    };

    let settlement = state
        .settlement()
        .ok_or(AppError::NotConfigured("mp-missing-token"))?;

    let (payment, observation) = settlement.refresh(&payment_id).await?;
    tracing::info!(
        payment_id = %payment.id,
        status = %payment.status,
        ?observation,
        "gateway notification applied"
    );

    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_id_from_body() {
        let body = json!({ "type": "payment", "action": "payment.updated", "data": { "id": "123" } });
        assert_eq!(
            payment_id(&NotificationQuery::default(), Some(&body)).as_deref(),
            Some("123")
        );

        let body = json!({ "type": "payment", "data": { "id": 456 } });
        assert_eq!(
            payment_id(&NotificationQuery::default(), Some(&body)).as_deref(),
            Some("456")
        );
    }

    #[test]
    fn test_payment_id_from_query() {
        let query = NotificationQuery {
            topic: Some("payment".to_string()),
            id: Some("789".to_string()),
            ..NotificationQuery::default()
        };
        assert_eq!(payment_id(&query, None).as_deref(), Some("789"));

        let query = NotificationQuery {
            kind: Some("payment".to_string()),
            data_id: Some("790".to_string()),
            ..NotificationQuery::default()
        };
        assert_eq!(payment_id(&query, None).as_deref(), Some("790"));
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let query = NotificationQuery {
            topic: Some("merchant_order".to_string()),
            id: Some("1".to_string()),
            ..NotificationQuery::default()
        };
        assert_eq!(payment_id(&query, None), None);
        assert_eq!(payment_id(&NotificationQuery::default(), None), None);
    }
}
