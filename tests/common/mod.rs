//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keymarket_returns::auth::{AuthContext, Role};
use keymarket_returns::domain::{
    GrantId, LedgerEntryId, LicenseKeyGrant, Money, NewLedgerEntry, Order, OrderId, OrderItem,
    OrderItemId, OrderStatus, Page, PageResult, Points, PointsBalance, PointsLedgerEntry,
    ProductId, RefundPolicy, Return, ReturnId, ReturnQuery, ReturnStatus, ReturnsSummary,
    TransitionUpdate, UserId,
};
use keymarket_returns::engine::{AdminQueries, ReturnsEngine};
use keymarket_returns::infra::{
    CreditReceipt, EngineError, OrderService, PointsLedger, Result, ReturnsStore, WalletService,
};
use keymarket_returns::notify::{Notification, NotificationDispatcher, ReturnEvent};

/// Test customer ID
pub fn test_customer_id() -> UserId {
    UserId::from_uuid(Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap())
}

/// Test operator ID
pub fn test_operator_id() -> UserId {
    UserId::from_uuid(Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap())
}

/// A second customer, for ownership checks
pub fn other_customer_id() -> UserId {
    UserId::from_uuid(Uuid::parse_str("33333333-3333-3333-3333-333333333333").unwrap())
}

pub fn customer_auth() -> AuthContext {
    AuthContext {
        user_id: test_customer_id(),
        role: Role::User,
    }
}

pub fn other_customer_auth() -> AuthContext {
    AuthContext {
        user_id: other_customer_id(),
        role: Role::User,
    }
}

pub fn operator_auth() -> AuthContext {
    AuthContext {
        user_id: test_operator_id(),
        role: Role::Operator,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A settled order created now, inside the return window.
pub fn paid_order(customer: UserId, total: Money, points_used: Points) -> Order {
    Order {
        id: OrderId::new(),
        customer_id: customer,
        status: OrderStatus::Paid,
        total_amount: total,
        points_used,
        points_earned: 0,
        discount_amount: points_used * 10,
        created_at: Utc::now(),
    }
}

/// An order line with `count` license key grants at `unit_price` each.
pub fn item_with_grants(order_id: OrderId, unit_price: Money, count: usize) -> OrderItem {
    let grants = (0..count)
        .map(|i| LicenseKeyGrant {
            id: GrantId::new(),
            key: format!("GAME-{i:04}-XXXX-YYYY"),
        })
        .collect::<Vec<_>>();
    OrderItem {
        id: OrderItemId::new(),
        order_id,
        product_id: ProductId::new(),
        product_name: "Dungeon Crawler Deluxe".to_string(),
        unit_price,
        quantity: count as u32,
        grants,
    }
}

pub fn grant_ids(item: &OrderItem) -> Vec<GrantId> {
    item.grants.iter().map(|g| g.id).collect()
}

// ============================================================================
// In-memory infrastructure
// ============================================================================

#[derive(Default)]
struct EngineState {
    returns: HashMap<Uuid, Return>,
    claims: HashMap<GrantId, (ReturnId, OrderId)>,
    entries: Vec<PointsLedgerEntry>,
}

impl EngineState {
    fn balance_of(&self, user_id: UserId) -> Points {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.amount)
            .sum()
    }

    fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<PointsLedgerEntry> {
        let balance = self.balance_of(entry.user_id);
        if entry.amount < 0 && balance + entry.amount < 0 {
            return Err(EngineError::InsufficientBalance {
                balance,
                requested: entry.amount.abs(),
            });
        }
        let stored = PointsLedgerEntry {
            id: LedgerEntryId::new(),
            user_id: entry.user_id,
            amount: entry.amount,
            entry_type: entry.entry_type,
            description: entry.description,
            order_id: entry.order_id,
            return_id: entry.return_id,
            created_at: Utc::now(),
        };
        self.entries.push(stored.clone());
        Ok(stored)
    }
}

/// In-memory [`ReturnsStore`] with the same CAS and claim semantics as the
/// Postgres implementation.
pub struct InMemoryStore {
    state: Arc<Mutex<EngineState>>,
}

#[async_trait]
impl ReturnsStore for InMemoryStore {
    async fn insert_return(&self, ret: &Return) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for item in &ret.items {
            if state.claims.contains_key(&item.grant_id) {
                return Err(EngineError::GrantAlreadyClaimed {
                    grant_id: item.grant_id.to_string(),
                });
            }
        }
        for item in &ret.items {
            state.claims.insert(item.grant_id, (ret.id, ret.order_id));
        }
        state.returns.insert(ret.id.0, ret.clone());
        Ok(())
    }

    async fn get_return(&self, id: ReturnId) -> Result<Option<Return>> {
        Ok(self.state.lock().unwrap().returns.get(&id.0).cloned())
    }

    async fn claimed_grants(&self, order_id: OrderId) -> Result<Vec<GrantId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .claims
            .iter()
            .filter(|(_, (_, claim_order))| *claim_order == order_id)
            .map(|(grant_id, _)| *grant_id)
            .collect())
    }

    async fn transition(
        &self,
        id: ReturnId,
        expected: &[ReturnStatus],
        update: TransitionUpdate,
    ) -> Result<Return> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .returns
            .get(&id.0)
            .ok_or_else(|| EngineError::not_found("return", id))?
            .clone();

        if !expected.contains(&current.status) {
            return Err(EngineError::InvalidTransition {
                return_id: id.to_string(),
                from: current.status,
                to: update.to,
            });
        }

        let ret = state.returns.get_mut(&id.0).unwrap();
        ret.status = update.to;
        if update.admin_notes.is_some() {
            ret.admin_notes = update.admin_notes;
        }
        if let Some(method) = update.refund_method {
            ret.refund_method = method;
        }
        if update.processed_at.is_some() {
            ret.processed_at = update.processed_at;
        }
        let result = ret.clone();

        if !update.to.claims_grants() {
            state.claims.retain(|_, (claim_return, _)| *claim_return != id);
        }
        Ok(result)
    }

    async fn commit_refund(
        &self,
        id: ReturnId,
        processed_at: DateTime<Utc>,
        ledger_entry: Option<NewLedgerEntry>,
    ) -> Result<Return> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .returns
            .get(&id.0)
            .ok_or_else(|| EngineError::not_found("return", id))?
            .clone();

        match current.status {
            ReturnStatus::Approved => {}
            ReturnStatus::Refunded => {
                return Err(EngineError::ConcurrencyConflict(format!(
                    "return {id} was finalized concurrently"
                )))
            }
            from => {
                return Err(EngineError::InvalidTransition {
                    return_id: id.to_string(),
                    from,
                    to: ReturnStatus::Refunded,
                })
            }
        }

        if let Some(entry) = ledger_entry {
            state.append_entry(entry)?;
        }

        let ret = state.returns.get_mut(&id.0).unwrap();
        ret.status = ReturnStatus::Refunded;
        ret.processed_at = Some(processed_at);
        Ok(ret.clone())
    }

    async fn list(&self, query: &ReturnQuery) -> Result<PageResult<Return>> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<Return> = state
            .returns
            .values()
            .filter(|r| {
                query.filter.user_id.map_or(true, |u| r.user_id == u)
                    && query.filter.status.map_or(true, |s| r.status == s)
                    && query.filter.order_id.map_or(true, |o| r.order_id == o)
                    && query.filter.created_from.map_or(true, |f| r.created_at >= f)
                    && query.filter.created_to.map_or(true, |t| r.created_at <= t)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.limit as usize)
            .collect();
        Ok(PageResult::new(items, total, query.page))
    }

    async fn summary(&self) -> Result<ReturnsSummary> {
        let state = self.state.lock().unwrap();
        let mut summary = ReturnsSummary::default();
        for ret in state.returns.values() {
            let count = summary.count_for(ret.status);
            summary.set_count(ret.status, count + 1);
            if ret.status == ReturnStatus::Refunded {
                summary.total_refunded_amount += ret.refund_amount;
            }
        }
        Ok(summary)
    }
}

/// In-memory [`PointsLedger`] sharing state with [`InMemoryStore`] so
/// `commit_refund` entries are visible through it.
pub struct InMemoryLedger {
    state: Arc<Mutex<EngineState>>,
}

#[async_trait]
impl PointsLedger for InMemoryLedger {
    async fn append(&self, entry: NewLedgerEntry) -> Result<PointsLedgerEntry> {
        self.state.lock().unwrap().append_entry(entry)
    }

    async fn balance(&self, user_id: UserId) -> Result<PointsBalance> {
        let state = self.state.lock().unwrap();
        Ok(PointsBalance::from_entries(
            state.entries.iter().filter(|e| e.user_id == user_id),
        ))
    }

    async fn entries(&self, user_id: UserId, page: Page) -> Result<PageResult<PointsLedgerEntry>> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<PointsLedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matching.reverse();

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(PageResult::new(items, total, page))
    }
}

/// Order service backed by a map of seeded fixtures.
#[derive(Default)]
pub struct StaticOrderService {
    orders: Mutex<HashMap<Uuid, (Order, Vec<OrderItem>)>>,
}

impl StaticOrderService {
    pub fn insert(&self, order: Order, items: Vec<OrderItem>) {
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.0, (order, items));
    }
}

#[async_trait]
impl OrderService for StaticOrderService {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(&id.0)
            .map(|(order, _)| order.clone()))
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(&order_id.0)
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }
}

/// Wallet that records issued credits and can be told to fail.
///
/// Mirrors the production contract: `return_id` is the idempotency key, so
/// a repeated issuance for the same return hands back the original receipt
/// instead of recording a second credit. An optional gate barrier lets
/// race tests hold every caller inside the wallet call at once.
#[derive(Default)]
pub struct RecordingWallet {
    pub credits: Mutex<Vec<(UserId, Money)>>,
    receipts: Mutex<HashMap<ReturnId, CreditReceipt>>,
    gate: Mutex<Option<Arc<tokio::sync::Barrier>>>,
    pub fail: AtomicBool,
}

impl RecordingWallet {
    pub fn issued(&self) -> Vec<(UserId, Money)> {
        self.credits.lock().unwrap().clone()
    }

    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every subsequent issuance waits on this barrier before recording.
    pub fn hold_at_gate(&self, barrier: Arc<tokio::sync::Barrier>) {
        *self.gate.lock().unwrap() = Some(barrier);
    }
}

#[async_trait]
impl WalletService for RecordingWallet {
    async fn issue_store_credit(
        &self,
        user_id: UserId,
        amount: Money,
        return_id: ReturnId,
    ) -> Result<CreditReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::ExternalService(
                "wallet gateway unavailable".to_string(),
            ));
        }

        let gate = self.gate.lock().unwrap().clone();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }

        let mut receipts = self.receipts.lock().unwrap();
        if let Some(existing) = receipts.get(&return_id) {
            return Ok(existing.clone());
        }

        let receipt = CreditReceipt {
            receipt_id: Uuid::new_v4(),
            user_id,
            amount,
            issued_at: Utc::now(),
        };
        receipts.insert(return_id, receipt.clone());
        self.credits.lock().unwrap().push((user_id, amount));
        Ok(receipt)
    }
}

/// Dispatcher that records the events it sees.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub events: Mutex<Vec<ReturnEvent>>,
}

impl RecordingDispatcher {
    pub fn seen(&self) -> Vec<ReturnEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.events.lock().unwrap().push(notification.event);
    }
}

// ============================================================================
// Assembled test environment
// ============================================================================

pub struct TestEnv {
    pub engine: Arc<ReturnsEngine>,
    pub admin: Arc<AdminQueries>,
    pub store: Arc<InMemoryStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub orders: Arc<StaticOrderService>,
    pub wallet: Arc<RecordingWallet>,
    pub events: Arc<RecordingDispatcher>,
}

pub fn test_env() -> TestEnv {
    test_env_with_policy(RefundPolicy::default())
}

pub fn test_env_with_policy(policy: RefundPolicy) -> TestEnv {
    let state = Arc::new(Mutex::new(EngineState::default()));
    let store = Arc::new(InMemoryStore {
        state: state.clone(),
    });
    let ledger = Arc::new(InMemoryLedger { state });
    let orders = Arc::new(StaticOrderService::default());
    let wallet = Arc::new(RecordingWallet::default());
    let events = Arc::new(RecordingDispatcher::default());

    let engine = Arc::new(ReturnsEngine::new(
        store.clone(),
        ledger.clone(),
        orders.clone(),
        wallet.clone(),
        events.clone(),
        policy,
    ));
    let admin = Arc::new(AdminQueries::new(store.clone()));

    TestEnv {
        engine,
        admin,
        store,
        ledger,
        orders,
        wallet,
        events,
    }
}

impl TestEnv {
    /// Seed a paid order with one item carrying `grants` license keys at
    /// `unit_price`, and return it with its grant ids.
    pub fn seed_order(
        &self,
        customer: UserId,
        total: Money,
        points_used: Points,
        unit_price: Money,
        grants: usize,
    ) -> (Order, Vec<GrantId>) {
        let order = paid_order(customer, total, points_used);
        let item = item_with_grants(order.id, unit_price, grants);
        let ids = grant_ids(&item);
        self.orders.insert(order.clone(), vec![item]);
        (order, ids)
    }

    /// Seed prior ledger history so refund credits have a base to sit on.
    pub async fn seed_earned_points(&self, user_id: UserId, amount: Points) {
        self.ledger
            .append(NewLedgerEntry {
                user_id,
                amount,
                entry_type: keymarket_returns::domain::LedgerEntryType::Earned,
                description: "Purchase reward".to_string(),
                order_id: None,
                return_id: None,
            })
            .await
            .expect("seeding earned points");
    }
}
