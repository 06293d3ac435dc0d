//! REST API surface: router, handlers, wire types, and error envelopes.

pub mod error;
pub mod handlers;
pub mod types;

pub use error::{ApiError, ErrorCode};

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

/// Build the `/api` router. Route order matters: the literal segments
/// under `/v1/returns` must be registered before the `:id` capture.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/returns", post(handlers::returns::create_return))
        .route(
            "/v1/returns/my-returns",
            get(handlers::returns::list_my_returns),
        )
        .route(
            "/v1/returns/eligibility/:order_id",
            get(handlers::eligibility::order_eligibility),
        )
        .route(
            "/v1/returns/admin/all",
            get(handlers::admin::list_all_returns),
        )
        .route(
            "/v1/returns/admin/summary",
            get(handlers::admin::returns_summary),
        )
        .route(
            "/v1/returns/admin/:id/process",
            post(handlers::admin::process_return),
        )
        .route(
            "/v1/returns/admin/:id/finalize",
            post(handlers::admin::finalize_return),
        )
        .route("/v1/returns/:id", get(handlers::returns::get_return))
        .route(
            "/v1/returns/:id/cancel",
            post(handlers::returns::cancel_return),
        )
        .route("/v1/points/balance", get(handlers::points::points_balance))
        .route("/v1/points/history", get(handlers::points::points_history))
}
