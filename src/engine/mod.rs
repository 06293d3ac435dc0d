//! Core business services: eligibility, the return state machine, and the
//! operator read side.

pub mod admin;
pub mod eligibility;
pub mod returns;

pub use admin::AdminQueries;
pub use eligibility::EligibilityChecker;
pub use returns::{CreateReturn, Decision, ReturnsEngine};

use crate::auth::AuthContext;
use crate::infra::{EngineError, Result};

/// Gate for operator-only operations.
pub(crate) fn require_operator(auth: &AuthContext) -> Result<()> {
    if auth.is_operator() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(
            "operator role required".to_string(),
        ))
    }
}
