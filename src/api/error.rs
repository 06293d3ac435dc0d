//! Structured API error responses with error codes
//!
//! Every endpoint returns errors in the same envelope, with a stable
//! machine-readable code, a numeric category, and an `x-error-code`
//! response header.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// No authentication credentials provided
    AuthRequired,
    /// Invalid API key format or value
    InvalidApiKey,
    /// Insufficient permissions for this operation
    InsufficientPermissions,

    // Validation errors (3xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// Field value is invalid
    InvalidFieldValue,
    /// Order or return fails a business rule (window, status, empty selection)
    NotEligible,

    // Resource errors (4xxx)
    /// Requested resource not found
    ResourceNotFound,
    /// Return not found
    ReturnNotFound,
    /// Order not found
    OrderNotFound,
    /// License key grant not found on the order
    GrantNotFound,

    // Conflict errors (5xxx)
    /// Grant already claimed by an active return
    GrantAlreadyClaimed,
    /// Transition not allowed from the current status
    InvalidStateTransition,
    /// Lost a race with a concurrent update
    ConcurrencyConflict,
    /// Ledger write would drive a balance negative
    InsufficientBalance,

    // Infrastructure errors (8xxx)
    /// Database operation failed
    DatabaseError,
    /// External service unavailable
    ServiceUnavailable,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            // Auth (1xxx)
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidApiKey => 1002,
            ErrorCode::InsufficientPermissions => 1005,

            // Validation (3xxx)
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3003,
            ErrorCode::NotEligible => 3010,

            // Resource (4xxx)
            ErrorCode::ResourceNotFound => 4001,
            ErrorCode::ReturnNotFound => 4002,
            ErrorCode::OrderNotFound => 4003,
            ErrorCode::GrantNotFound => 4004,

            // Conflict (5xxx)
            ErrorCode::GrantAlreadyClaimed => 5001,
            ErrorCode::InvalidStateTransition => 5002,
            ErrorCode::ConcurrencyConflict => 5003,
            ErrorCode::InsufficientBalance => 5004,

            // Infrastructure (8xxx)
            ErrorCode::DatabaseError => 8001,
            ErrorCode::ServiceUnavailable => 8002,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Auth errors -> 401/403
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorCode::InsufficientPermissions => StatusCode::FORBIDDEN,

            // Validation -> 400/422
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::NotEligible => StatusCode::UNPROCESSABLE_ENTITY,

            // Resource -> 404
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ReturnNotFound => StatusCode::NOT_FOUND,
            ErrorCode::OrderNotFound => StatusCode::NOT_FOUND,
            ErrorCode::GrantNotFound => StatusCode::NOT_FOUND,

            // Conflict -> 409
            ErrorCode::GrantAlreadyClaimed => StatusCode::CONFLICT,
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::ConcurrencyConflict => StatusCode::CONFLICT,
            ErrorCode::InsufficientBalance => StatusCode::CONFLICT,

            // Infrastructure -> 500/503
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::NotEligible => "NOT_ELIGIBLE",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ReturnNotFound => "RETURN_NOT_FOUND",
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::GrantNotFound => "GRANT_NOT_FOUND",
            ErrorCode::GrantAlreadyClaimed => "GRANT_ALREADY_CLAIMED",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                resource_id: None,
            },
        }
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversion from EngineError
// ============================================================================

impl From<crate::infra::EngineError> for ApiError {
    fn from(err: crate::infra::EngineError) -> Self {
        use crate::infra::EngineError;

        match err {
            EngineError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ApiError::new(ErrorCode::DatabaseError, "Database error")
            }
            EngineError::Validation(msg) => ApiError::new(ErrorCode::NotEligible, msg),
            EngineError::NotFound { resource, id } => {
                let code = match resource {
                    "return" => ErrorCode::ReturnNotFound,
                    "order" => ErrorCode::OrderNotFound,
                    "grant" => ErrorCode::GrantNotFound,
                    _ => ErrorCode::ResourceNotFound,
                };
                ApiError::new(code, format!("{} not found: {}", resource, id))
                    .with_resource_id(id)
            }
            EngineError::Forbidden(msg) => {
                ApiError::new(ErrorCode::InsufficientPermissions, msg)
            }
            EngineError::InvalidTransition {
                return_id,
                from,
                to,
            } => ApiError::new(
                ErrorCode::InvalidStateTransition,
                format!("Invalid transition for return {}: {} -> {}", return_id, from, to),
            )
            .with_resource_id(return_id)
            .with_details(serde_json::json!({
                "from_status": from,
                "to_status": to
            })),
            EngineError::GrantAlreadyClaimed { grant_id } => ApiError::new(
                ErrorCode::GrantAlreadyClaimed,
                format!("Grant {} is already claimed by another return", grant_id),
            )
            .with_resource_id(grant_id),
            EngineError::InsufficientBalance { balance, requested } => ApiError::new(
                ErrorCode::InsufficientBalance,
                format!(
                    "Insufficient points balance: have {}, requested {}",
                    balance, requested
                ),
            )
            .with_details(serde_json::json!({
                "balance": balance,
                "requested": requested
            })),
            EngineError::ExternalService(msg) => {
                tracing::error!(error = %msg, "external service error");
                ApiError::new(ErrorCode::ServiceUnavailable, "Upstream service unavailable")
            }
            EngineError::ConcurrencyConflict(msg) => {
                ApiError::new(ErrorCode::ConcurrencyConflict, msg)
            }
            EngineError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ApiError::new(ErrorCode::InternalError, "Internal server error")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
