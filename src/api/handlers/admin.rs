//! Operator handlers: decisions, finalization, listings, and the summary.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{AdminListQuery, ProcessReturnRequest};
use crate::auth::AuthContextExt;
use crate::domain::{PageResult, Return, ReturnId, ReturnQuery, ReturnsSummary};
use crate::server::AppState;

/// POST /api/v1/returns/admin/:id/process - Approve or reject a pending return.
pub async fn process_return(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(id): Path<ReturnId>,
    Json(body): Json<ProcessReturnRequest>,
) -> Result<Json<Return>, ApiError> {
    let ret = state
        .retry
        .run(|| {
            state.engine.decide(
                &auth,
                id,
                body.status.into(),
                body.admin_notes.clone(),
                body.refund_method,
            )
        })
        .await?;
    Ok(Json(ret))
}

/// POST /api/v1/returns/admin/:id/finalize - Execute the refund side effects.
pub async fn finalize_return(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(id): Path<ReturnId>,
) -> Result<Json<Return>, ApiError> {
    let ret = state
        .retry
        .run(|| state.engine.finalize(&auth, id))
        .await?;
    Ok(Json(ret))
}

/// GET /api/v1/returns/admin/all - List returns across all customers.
pub async fn list_all_returns(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PageResult<Return>>, ApiError> {
    let query: ReturnQuery = query.into();
    let page = state.admin.list_all(&auth, &query).await?;
    Ok(Json(page))
}

/// GET /api/v1/returns/admin/summary - Counts per status and refunded total.
pub async fn returns_summary(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<Json<ReturnsSummary>, ApiError> {
    let summary = state.admin.summary(&auth).await?;
    Ok(Json(summary))
}
