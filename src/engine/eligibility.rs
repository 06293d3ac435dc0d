//! Eligibility checker: which purchased license key grants may still be
//! returned for a given order.

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::AuthContext;
use crate::domain::{
    EligibleGrant, Order, OrderId, OrderItem, RefundPolicy,
};
use crate::infra::{EngineError, OrderService, Result, ReturnsStore};

/// Checks return eligibility at the order and grant level.
///
/// A grant is eligible iff it belongs to the order and is not currently
/// claimed by a return in a claiming status (pending/approved/refunded).
/// Rejected and cancelled returns free their grants again.
pub struct EligibilityChecker {
    orders: Arc<dyn OrderService>,
    store: Arc<dyn ReturnsStore>,
    policy: RefundPolicy,
}

impl EligibilityChecker {
    pub fn new(
        orders: Arc<dyn OrderService>,
        store: Arc<dyn ReturnsStore>,
        policy: RefundPolicy,
    ) -> Self {
        Self {
            orders,
            store,
            policy,
        }
    }

    /// Load the order and enforce the order-level gates: ownership, settled
    /// status, and the return window.
    ///
    /// Non-operators only ever learn about their own orders, so a foreign
    /// order surfaces as not-found rather than forbidden.
    pub async fn order_for_return(&self, auth: &AuthContext, order_id: OrderId) -> Result<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("order", order_id))?;

        if !auth.is_operator() && order.customer_id != auth.user_id {
            return Err(EngineError::not_found("order", order_id));
        }

        if !order.status.is_return_eligible() {
            return Err(EngineError::Validation(format!(
                "order {order_id} is not eligible for returns in its current status"
            )));
        }

        let window = Duration::days(self.policy.return_window_days);
        if Utc::now() - order.created_at > window {
            return Err(EngineError::Validation(format!(
                "order {order_id} is outside the {}-day return window",
                self.policy.return_window_days
            )));
        }

        Ok(order)
    }

    /// Grants on the order not claimed by any active return, with the
    /// display data the storefront needs.
    pub async fn eligible_grants_for(&self, order: &Order) -> Result<Vec<EligibleGrant>> {
        let items = self.orders.get_order_items(order.id).await?;
        let claimed: HashSet<_> = self
            .store
            .claimed_grants(order.id)
            .await?
            .into_iter()
            .collect();

        Ok(collect_eligible(&items, &claimed))
    }

    /// Full check: order gates plus per-grant availability. An order with
    /// nothing left to return yields an empty list, not an error.
    pub async fn eligible_grants(
        &self,
        auth: &AuthContext,
        order_id: OrderId,
    ) -> Result<Vec<EligibleGrant>> {
        let order = self.order_for_return(auth, order_id).await?;
        self.eligible_grants_for(&order).await
    }
}

fn collect_eligible(
    items: &[OrderItem],
    claimed: &HashSet<crate::domain::GrantId>,
) -> Vec<EligibleGrant> {
    let mut eligible = Vec::new();
    for item in items {
        for grant in &item.grants {
            if claimed.contains(&grant.id) {
                continue;
            }
            eligible.push(EligibleGrant {
                grant_id: grant.id,
                order_item_id: item.id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                unit_price: item.unit_price,
                key_preview: grant.masked_preview(),
            });
        }
    }
    eligible
}
