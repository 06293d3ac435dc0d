//! Points balance and ledger history handlers.

use axum::extract::{Extension, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{BalanceResponse, HistoryQuery};
use crate::auth::AuthContextExt;
use crate::domain::{PageResult, PointsLedgerEntry};
use crate::server::AppState;

/// GET /api/v1/points/balance - The caller's current points balance.
pub async fn points_balance(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.engine.ledger().balance(auth.user_id).await?;
    Ok(Json(BalanceResponse {
        user_id: auth.user_id,
        balance,
    }))
}

/// GET /api/v1/points/history - The caller's ledger entries, newest first.
pub async fn points_history(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PageResult<PointsLedgerEntry>>, ApiError> {
    let page = state
        .engine
        .ledger()
        .entries(auth.user_id, query.page())
        .await?;
    Ok(Json(page))
}
