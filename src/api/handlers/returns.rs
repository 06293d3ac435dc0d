//! Customer-facing return lifecycle handlers.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{CreateReturnRequest, MyReturnsQuery};
use crate::auth::AuthContextExt;
use crate::domain::{PageResult, Return, ReturnId};
use crate::engine::CreateReturn;
use crate::server::AppState;

/// POST /api/v1/returns - Create a return request.
pub async fn create_return(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(body): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<Return>), ApiError> {
    let input = CreateReturn {
        order_id: body.order_id,
        reason: body.reason,
        grant_ids: body.grant_ids,
        notes: body.notes,
    };

    let ret = state
        .retry
        .run(|| state.engine.create(&auth, input.clone()))
        .await?;
    Ok((StatusCode::CREATED, Json(ret)))
}

/// GET /api/v1/returns/my-returns - List the caller's returns.
pub async fn list_my_returns(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Query(query): Query<MyReturnsQuery>,
) -> Result<Json<PageResult<Return>>, ApiError> {
    let page = state
        .engine
        .list_mine(&auth, query.status, query.page())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/returns/:id - Fetch a single return.
pub async fn get_return(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(id): Path<ReturnId>,
) -> Result<Json<Return>, ApiError> {
    let ret = state.engine.get(&auth, id).await?;
    Ok(Json(ret))
}

/// POST /api/v1/returns/:id/cancel - Cancel a pending or approved return.
pub async fn cancel_return(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(id): Path<ReturnId>,
) -> Result<Json<Return>, ApiError> {
    let ret = state
        .retry
        .run(|| state.engine.cancel(&auth, id))
        .await?;
    Ok(Json(ret))
}
