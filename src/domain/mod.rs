//! Core domain types for the returns engine.

pub mod ledger;
pub mod order;
pub mod refund;
pub mod returns;
pub mod types;

pub use ledger::{
    LedgerEntryType, NewLedgerEntry, PointsBalance, PointsLedgerEntry,
};
pub use order::{EligibleGrant, LicenseKeyGrant, Order, OrderItem, OrderStatus};
pub use refund::{compute_refund, RefundPolicy, RefundResult};
pub use returns::{
    RefundMethod, Return, ReturnFilter, ReturnItem, ReturnQuery, ReturnStatus, ReturnsSummary,
    TransitionUpdate,
};
pub use types::{
    GrantId, LedgerEntryId, Money, OrderId, OrderItemId, Page, PageResult, Points, ProductId,
    ReturnId, ReturnItemId, UserId,
};
