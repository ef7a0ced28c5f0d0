//! Credit balance route handler.

use axum::{Json, extract::State};
use serde::Serialize;

use credits_core::Credits;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::LedgerEntry;
use crate::state::AppState;

/// Ledger entries returned with the balance.
const LEDGER_LIMIT: i64 = 50;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub ok: bool,
    pub balance: Credits,
    pub ledger: Vec<LedgerEntry>,
}

/// Current balance and most recent ledger entries.
///
/// # Route
///
/// `GET /api/credits`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CreditsResponse>> {
    let balance = state.payments().balance(user.id).await?;
    let ledger = state.payments().ledger(user.id, LEDGER_LIMIT).await?;

    Ok(Json(CreditsResponse {
        ok: true,
        balance,
        ledger,
    }))
}
