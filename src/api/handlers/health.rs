//! Health and readiness handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::server::AppState;

/// Response for the basic health check endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness probe. No deep checks.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "keymarket-returns",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness probe. Pings the database when one is configured; in-process
/// deployments without a pool report ready on the service alone.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let database = match state.pool {
        Some(ref pool) => {
            let start = std::time::Instant::now();
            match sqlx::query("SELECT 1").execute(pool).await {
                Ok(_) => serde_json::json!({
                    "connected": true,
                    "response_time_ms": start.elapsed().as_millis() as u64,
                }),
                Err(e) => {
                    return Err((
                        StatusCode::SERVICE_UNAVAILABLE,
                        format!("Database unavailable: {}", e),
                    ))
                }
            }
        }
        None => serde_json::Value::Null,
    };

    Ok(Json(serde_json::json!({
        "status": "ready",
        "database": database,
    })))
}
