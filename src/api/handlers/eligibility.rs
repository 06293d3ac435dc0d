//! Eligibility preview handler.

use axum::extract::{Extension, Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::EligibilityResponse;
use crate::auth::AuthContextExt;
use crate::domain::OrderId;
use crate::server::AppState;

/// GET /api/v1/returns/eligibility/:order_id - Grants still returnable on an order.
pub async fn order_eligibility(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    let eligible_grants = state
        .engine
        .eligibility()
        .eligible_grants(&auth, order_id)
        .await?;

    Ok(Json(EligibilityResponse {
        order_id,
        eligible_grants,
    }))
}
