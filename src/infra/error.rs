//! Error types for the returns engine.

use thiserror::Error;

use crate::domain::{Points, ReturnStatus};

/// Errors that can occur in the returns engine and its infrastructure.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bad input (empty reason, empty grant set, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource absent or not owned by the caller
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Caller lacks the required role or ownership
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// State machine guard violated
    #[error("invalid transition for return {return_id}: {from} -> {to}")]
    InvalidTransition {
        return_id: String,
        from: ReturnStatus,
        to: ReturnStatus,
    },

    /// A requested license key grant already belongs to an active return
    #[error("grant {grant_id} is already claimed by another return")]
    GrantAlreadyClaimed { grant_id: String },

    /// Ledger balance invariant would break
    #[error("insufficient points balance: have {balance}, requested {requested}")]
    InsufficientBalance { balance: Points, requested: Points },

    /// External collaborator (wallet/credit issuance) failed
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Lost a race on a locked return or ledger row
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Conflicts are worth one automatic retry at the service boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
