//! Return request domain model and its state machine.
//!
//! A return moves through a closed set of statuses with an explicit
//! transition table; any transition not in the table is rejected. Terminal
//! statuses (`rejected`, `refunded`, `cancelled`) admit no further mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{
    GrantId, Money, OrderId, OrderItemId, Page, ReturnId, ReturnItemId, UserId,
};

/// Return request status.
///
/// Transition table:
/// - `pending   -> approved | rejected | cancelled`
/// - `approved  -> refunded | cancelled`
/// - `rejected`, `refunded`, `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Refunded,
    Cancelled,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 5] = [
        ReturnStatus::Pending,
        ReturnStatus::Approved,
        ReturnStatus::Rejected,
        ReturnStatus::Refunded,
        ReturnStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Rejected | ReturnStatus::Refunded | ReturnStatus::Cancelled
        )
    }

    /// Whether a grant attached to a return in this status is still claimed,
    /// i.e. unavailable for a new return.
    pub fn claims_grants(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Pending | ReturnStatus::Approved | ReturnStatus::Refunded
        )
    }

    /// The explicit transition table.
    pub fn can_transition(&self, to: ReturnStatus) -> bool {
        matches!(
            (self, to),
            (ReturnStatus::Pending, ReturnStatus::Approved)
                | (ReturnStatus::Pending, ReturnStatus::Rejected)
                | (ReturnStatus::Pending, ReturnStatus::Cancelled)
                | (ReturnStatus::Approved, ReturnStatus::Refunded)
                | (ReturnStatus::Approved, ReturnStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::Refunded => "refunded",
            ReturnStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReturnStatus::Pending),
            "approved" => Ok(ReturnStatus::Approved),
            "rejected" => Ok(ReturnStatus::Rejected),
            "refunded" => Ok(ReturnStatus::Refunded),
            "cancelled" => Ok(ReturnStatus::Cancelled),
            other => Err(format!("unknown return status: {other}")),
        }
    }
}

/// How the refund is paid out. Business policy currently fixes this to
/// `store_credit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    OriginalPayment,
    #[default]
    StoreCredit,
    BankTransfer,
}

impl RefundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundMethod::OriginalPayment => "original_payment",
            RefundMethod::StoreCredit => "store_credit",
            RefundMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl FromStr for RefundMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original_payment" => Ok(RefundMethod::OriginalPayment),
            "store_credit" => Ok(RefundMethod::StoreCredit),
            "bank_transfer" => Ok(RefundMethod::BankTransfer),
            other => Err(format!("unknown refund method: {other}")),
        }
    }
}

/// A return request. Created by a customer, mutated only by the state
/// machine, never deleted — cancellation is a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Return {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: ReturnStatus,
    pub reason: String,
    /// Authoritative monetary refund, fixed at request time.
    pub refund_amount: Money,
    pub refund_method: RefundMethod,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set on the first decision and on the refunded transition.
    pub processed_at: Option<DateTime<Utc>>,
    pub items: Vec<ReturnItem>,
}

/// One returned license key grant with the price it sold at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: ReturnItemId,
    pub return_id: ReturnId,
    pub order_item_id: OrderItemId,
    pub grant_id: GrantId,
    pub unit_price: Money,
    pub reason: Option<String>,
}

/// Mutation applied together with a status CAS in the store.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub to: ReturnStatus,
    pub admin_notes: Option<String>,
    pub refund_method: Option<RefundMethod>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Filters for listing returns.
#[derive(Debug, Clone, Default)]
pub struct ReturnFilter {
    pub user_id: Option<UserId>,
    pub status: Option<ReturnStatus>,
    pub order_id: Option<OrderId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Listing request: filter + page.
#[derive(Debug, Clone, Default)]
pub struct ReturnQuery {
    pub filter: ReturnFilter,
    pub page: Page,
}

/// Operator-facing aggregate over all returns.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReturnsSummary {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub refunded: u64,
    pub cancelled: u64,
    /// Sum of `refund_amount` over returns in status `refunded`.
    pub total_refunded_amount: Money,
}

impl ReturnsSummary {
    pub fn count_for(&self, status: ReturnStatus) -> u64 {
        match status {
            ReturnStatus::Pending => self.pending,
            ReturnStatus::Approved => self.approved,
            ReturnStatus::Rejected => self.rejected,
            ReturnStatus::Refunded => self.refunded,
            ReturnStatus::Cancelled => self.cancelled,
        }
    }

    pub fn set_count(&mut self, status: ReturnStatus, count: u64) {
        match status {
            ReturnStatus::Pending => self.pending = count,
            ReturnStatus::Approved => self.approved = count,
            ReturnStatus::Rejected => self.rejected = count,
            ReturnStatus::Refunded => self.refunded = count,
            ReturnStatus::Cancelled => self.cancelled = count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_closed() {
        use ReturnStatus::*;

        let legal = [
            (Pending, Approved),
            (Pending, Rejected),
            (Pending, Cancelled),
            (Approved, Refunded),
            (Approved, Cancelled),
        ];

        for from in ReturnStatus::ALL {
            for to in ReturnStatus::ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        for from in ReturnStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ReturnStatus::ALL {
                assert!(!from.can_transition(to), "terminal {from} -> {to}");
            }
        }
    }

    #[test]
    fn grant_claim_statuses() {
        assert!(ReturnStatus::Pending.claims_grants());
        assert!(ReturnStatus::Approved.claims_grants());
        assert!(ReturnStatus::Refunded.claims_grants());
        assert!(!ReturnStatus::Rejected.claims_grants());
        assert!(!ReturnStatus::Cancelled.claims_grants());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in ReturnStatus::ALL {
            assert_eq!(status.as_str().parse::<ReturnStatus>(), Ok(status));
        }
        assert!("shipped".parse::<ReturnStatus>().is_err());
    }

    #[test]
    fn refund_method_defaults_to_store_credit() {
        assert_eq!(RefundMethod::default(), RefundMethod::StoreCredit);
        assert_eq!(
            "store_credit".parse::<RefundMethod>(),
            Ok(RefundMethod::StoreCredit)
        );
    }
}
