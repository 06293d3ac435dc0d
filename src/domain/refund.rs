//! Proportional refund calculator.
//!
//! Pure arithmetic, no side effects. Isolated here so the formula is
//! unit-testable independent of any transport or storage layer.
//!
//! Points are refunded only in proportion to the fraction of the order that
//! was actually paid in cash versus covered by the points discount already
//! used. Refunding 100% of points on a partial return would over-credit the
//! customer relative to what they paid in points.
//!
//! The double-floor truncation is preserved exactly as the business observed
//! it; see DESIGN.md before "fixing" it.

use serde::{Deserialize, Serialize};

use super::order::Order;
use super::types::{Money, Points};

/// Business policy knobs for refunds.
#[derive(Debug, Clone, Copy)]
pub struct RefundPolicy {
    /// Peso value of one loyalty point.
    pub pesos_per_point: Money,
    /// Days after order creation during which returns are accepted.
    pub return_window_days: i64,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            pesos_per_point: 10,
            return_window_days: 14,
        }
    }
}

/// Outcome of the refund computation for one return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    /// Authoritative monetary refund: the sum of the returned units' sale
    /// prices. Operators may not freely set it.
    pub monetary_refund: Money,
    /// Loyalty points to credit back, proportionally scaled and floored.
    pub points_to_refund: Points,
}

/// Compute the monetary refund and proportional points refund for the given
/// unit prices against their parent order.
///
/// Steps (exact integer semantics):
/// 1. `monetary = Σ unit_price`
/// 2. `points_used == 0` ⇒ no points refund
/// 3. `discount = points_used × pesos_per_point`
/// 4. `actual_paid = total − discount` (clamped at zero)
/// 5. `total == 0` ⇒ ratio is zero, never divide
/// 6. `points = floor(floor(monetary / ppp) × actual_paid / total)`
pub fn compute_refund(order: &Order, unit_prices: &[Money], policy: &RefundPolicy) -> RefundResult {
    let monetary_refund: Money = unit_prices.iter().sum();

    if order.points_used == 0 {
        return RefundResult {
            monetary_refund,
            points_to_refund: 0,
        };
    }

    if order.total_amount == 0 {
        return RefundResult {
            monetary_refund,
            points_to_refund: 0,
        };
    }

    let points_discount = order.points_used.saturating_mul(policy.pesos_per_point);
    let actual_paid = (order.total_amount - points_discount).max(0);

    // floor(monetary / ppp) then floor of the scaled product. The i128
    // widening keeps the intermediate product exact for any realistic order.
    let base_points = monetary_refund / policy.pesos_per_point;
    let points_to_refund =
        ((base_points as i128 * actual_paid as i128) / order.total_amount as i128) as Points;

    RefundResult {
        monetary_refund,
        points_to_refund: points_to_refund.max(0),
    }
}
