//! Operator read-side composition: listings and the returns summary.
//!
//! No invariants of its own beyond read consistency with the state
//! machine's writes.

use std::sync::Arc;

use crate::auth::AuthContext;
use crate::domain::{PageResult, Return, ReturnQuery, ReturnsSummary};
use crate::infra::{Result, ReturnsStore};

use super::require_operator;

/// Operator queries over all returns.
pub struct AdminQueries {
    store: Arc<dyn ReturnsStore>,
}

impl AdminQueries {
    pub fn new(store: Arc<dyn ReturnsStore>) -> Self {
        Self { store }
    }

    /// Paginated listing with status/date/order filters.
    pub async fn list_all(
        &self,
        auth: &AuthContext,
        query: &ReturnQuery,
    ) -> Result<PageResult<Return>> {
        require_operator(auth)?;
        self.store.list(query).await
    }

    /// Counts per status and the total refunded amount.
    pub async fn summary(&self, auth: &AuthContext) -> Result<ReturnsSummary> {
        require_operator(auth)?;
        self.store.summary().await
    }
}
