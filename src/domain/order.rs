//! Read models for orders as served by the external order/catalog service.
//!
//! Orders are immutable once paid; this engine never writes them. The fields
//! here are the subset the eligibility checker and refund calculator need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{GrantId, Money, OrderId, OrderItemId, Points, ProductId, UserId};

/// Order status as reported by the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Only settled orders can be returned against.
    pub fn is_return_eligible(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A completed order, read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    /// Loyalty points the customer spent on this order.
    pub points_used: Points,
    /// Loyalty points the order earned for the customer.
    pub points_earned: Points,
    /// Peso discount already applied from `points_used`.
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// An order line with its sold license key grants (one grant per unit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub grants: Vec<LicenseKeyGrant>,
}

/// One sold license key unit. The atomic unit of return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseKeyGrant {
    pub id: GrantId,
    /// Full key material. Never exposed in eligibility responses; use
    /// [`LicenseKeyGrant::masked_preview`].
    pub key: String,
}

impl LicenseKeyGrant {
    /// Masked key preview for display, e.g. `ABCD-****`.
    pub fn masked_preview(&self) -> String {
        let visible: String = self.key.chars().take(4).collect();
        if self.key.chars().count() <= 4 {
            "****".to_string()
        } else {
            format!("{visible}-****")
        }
    }
}

/// A grant that may still be returned, with denormalized display data.
#[derive(Debug, Clone, Serialize)]
pub struct EligibleGrant {
    pub grant_id: GrantId,
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub key_preview: String,
}
