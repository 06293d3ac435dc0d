//! Loyalty points ledger domain model.
//!
//! The ledger is append-only: entries are never mutated or deleted, and the
//! balance is always derivable as the sum of a user's entries. Corrections
//! are made with new `adjustment` entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{LedgerEntryId, OrderId, Points, ReturnId, UserId};

/// Classification of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Points earned from a purchase.
    Earned,
    /// Points spent as a discount (negative amount).
    Spent,
    /// Points credited back by a finalized return.
    Refund,
    /// Manual correction by an operator.
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Earned => "earned",
            LedgerEntryType::Spent => "spent",
            LedgerEntryType::Refund => "refund",
            LedgerEntryType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(LedgerEntryType::Earned),
            "spent" => Ok(LedgerEntryType::Spent),
            "refund" => Ok(LedgerEntryType::Refund),
            "adjustment" => Ok(LedgerEntryType::Adjustment),
            other => Err(format!("unknown ledger entry type: {other}")),
        }
    }
}

/// An immutable points ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsLedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    /// Signed amount: positive = credit, negative = debit.
    pub amount: Points,
    pub entry_type: LedgerEntryType,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub return_id: Option<ReturnId>,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry waiting to be appended.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub amount: Points,
    pub entry_type: LedgerEntryType,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub return_id: Option<ReturnId>,
}

impl NewLedgerEntry {
    /// Points credited back when a return is finalized.
    pub fn refund(user_id: UserId, amount: Points, order_id: OrderId, return_id: ReturnId) -> Self {
        Self {
            user_id,
            amount,
            entry_type: LedgerEntryType::Refund,
            description: format!("Points refund for return {return_id}"),
            order_id: Some(order_id),
            return_id: Some(return_id),
        }
    }
}

/// Derived balance view. Never stored as independent truth; always
/// reproducible from the entry history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct PointsBalance {
    pub balance: Points,
    pub total_earned: Points,
    pub total_spent: Points,
}

impl PointsBalance {
    /// Fold a set of entries into the derived view.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a PointsLedgerEntry>,
    {
        let mut view = PointsBalance::default();
        for entry in entries {
            view.balance += entry.amount;
            if entry.amount > 0 {
                view.total_earned += entry.amount;
            }
            if entry.entry_type == LedgerEntryType::Spent {
                view.total_spent += entry.amount.abs();
            }
        }
        view
    }
}
