//! Trait definitions for the returns engine's storage and collaborators.
//!
//! The engine mutates state only through [`ReturnsStore`] and
//! [`PointsLedger`]; orders, wallet credit, and notifications are external
//! collaborators consumed through narrow interfaces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    GrantId, Money, NewLedgerEntry, Order, OrderId, OrderItem, Page, PageResult, PointsBalance,
    PointsLedgerEntry, Return, ReturnId, ReturnQuery, ReturnStatus, ReturnsSummary,
    TransitionUpdate, UserId,
};

use super::Result;

/// Persistent store for return requests and their grant claims.
///
/// Invariants the implementation must uphold:
/// - A grant may be claimed by at most one return in a claiming status
///   (pending/approved/refunded); `insert_return` fails with
///   `GrantAlreadyClaimed` otherwise.
/// - `transition` is a compare-and-swap on status: it succeeds only when the
///   current status is one of `expected`, and releases grant claims when the
///   target status no longer claims them. All of this is one atomic unit.
/// - `commit_refund` atomically moves approved -> refunded and appends the
///   points ledger entry; a crash can never leave one without the other.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReturnsStore: Send + Sync {
    /// Persist a freshly created return with its items and grant claims.
    async fn insert_return(&self, ret: &Return) -> Result<()>;

    /// Load a return with its items.
    async fn get_return(&self, id: ReturnId) -> Result<Option<Return>>;

    /// Grants on this order currently claimed by an active return.
    async fn claimed_grants(&self, order_id: OrderId) -> Result<Vec<GrantId>>;

    /// Compare-and-swap status transition. Fails with `InvalidTransition`
    /// when the current status is not in `expected`.
    async fn transition(
        &self,
        id: ReturnId,
        expected: &[ReturnStatus],
        update: TransitionUpdate,
    ) -> Result<Return>;

    /// Atomically transition approved -> refunded and append the refund
    /// ledger entry (when points are due).
    async fn commit_refund(
        &self,
        id: ReturnId,
        processed_at: DateTime<Utc>,
        ledger_entry: Option<NewLedgerEntry>,
    ) -> Result<Return>;

    /// Paginated listing.
    async fn list(&self, query: &ReturnQuery) -> Result<PageResult<Return>>;

    /// Operator aggregate: counts per status and total refunded amount.
    async fn summary(&self) -> Result<ReturnsSummary>;
}

/// Append-only loyalty points ledger.
///
/// Appends for a single user are serialized so the balance-sufficiency check
/// is race-free; the balance is the single source of truth and no component
/// may cache it independent of the entry history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Append an entry. Negative amounts are rejected with
    /// `InsufficientBalance` when they would take the balance below zero.
    async fn append(&self, entry: NewLedgerEntry) -> Result<PointsLedgerEntry>;

    /// Derived balance, recomputed from the entry history.
    async fn balance(&self, user_id: UserId) -> Result<PointsBalance>;

    /// A user's entries, newest first.
    async fn entries(&self, user_id: UserId, page: Page) -> Result<PageResult<PointsLedgerEntry>>;
}

/// External order/catalog service. Read-only to this engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Order lines with their sold license key grants.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;
}

/// Receipt returned by the wallet collaborator for an issued credit.
#[derive(Debug, Clone, Serialize)]
pub struct CreditReceipt {
    pub receipt_id: Uuid,
    pub user_id: UserId,
    pub amount: Money,
    pub issued_at: DateTime<Utc>,
}

/// External wallet/credit issuance service. Opaque to this engine; a failure
/// during finalize is a hard error that aborts the transition.
///
/// `return_id` is the idempotency key: issuing again for the same return
/// must return the original receipt without creating a second credit, so
/// concurrent or retried finalizes can never double-credit a customer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn issue_store_credit(
        &self,
        user_id: UserId,
        amount: Money,
        return_id: ReturnId,
    ) -> Result<CreditReceipt>;
}
