//! Return state machine service.
//!
//! Owns the lifecycle of a return request: creation, operator decisions,
//! finalization (the only operation that moves money and points), and
//! cancellation. Every mutating operation is a guarded transition; the
//! store executes transition + ledger write + grant release as one atomic
//! unit, and notifications are dispatched outside that boundary.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::AuthContext;
use crate::domain::{
    compute_refund, GrantId, Money, NewLedgerEntry, OrderId, OrderItemId, Page, PageResult,
    RefundMethod, RefundPolicy, Return, ReturnFilter, ReturnId, ReturnItem, ReturnItemId,
    ReturnQuery, ReturnStatus, TransitionUpdate,
};
use crate::infra::{EngineError, OrderService, PointsLedger, Result, ReturnsStore, WalletService};
use crate::notify::{Notification, NotificationDispatcher, ReturnEvent};

use super::eligibility::EligibilityChecker;
use super::require_operator;

/// Input for creating a return request.
#[derive(Debug, Clone)]
pub struct CreateReturn {
    pub order_id: OrderId,
    pub reason: String,
    pub grant_ids: Vec<GrantId>,
    /// Optional free-text remark shown to the operator alongside the request.
    pub notes: Option<String>,
}

/// Operator decision on a pending return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// The return state machine and its collaborators.
pub struct ReturnsEngine {
    store: Arc<dyn ReturnsStore>,
    ledger: Arc<dyn PointsLedger>,
    orders: Arc<dyn OrderService>,
    wallet: Arc<dyn WalletService>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    eligibility: EligibilityChecker,
    policy: RefundPolicy,
}

impl ReturnsEngine {
    pub fn new(
        store: Arc<dyn ReturnsStore>,
        ledger: Arc<dyn PointsLedger>,
        orders: Arc<dyn OrderService>,
        wallet: Arc<dyn WalletService>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        policy: RefundPolicy,
    ) -> Self {
        let eligibility = EligibilityChecker::new(orders.clone(), store.clone(), policy);
        Self {
            store,
            ledger,
            orders,
            wallet,
            dispatcher,
            eligibility,
            policy,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn PointsLedger> {
        &self.ledger
    }

    pub fn eligibility(&self) -> &EligibilityChecker {
        &self.eligibility
    }

    /// Create a return in `pending` for the given grants.
    ///
    /// The refund amount is computed and fixed at request time as an
    /// advisory value; Finalize re-verifies points against the live order.
    #[instrument(skip(self, auth, request), fields(order_id = %request.order_id))]
    pub async fn create(&self, auth: &AuthContext, request: CreateReturn) -> Result<Return> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(EngineError::Validation("reason must not be empty".into()));
        }
        if request.grant_ids.is_empty() {
            return Err(EngineError::Validation(
                "at least one license key grant must be selected".into(),
            ));
        }
        {
            let mut seen = std::collections::HashSet::new();
            for grant_id in &request.grant_ids {
                if !seen.insert(grant_id) {
                    return Err(EngineError::Validation(format!(
                        "grant {grant_id} was selected more than once"
                    )));
                }
            }
        }

        let order = self
            .eligibility
            .order_for_return(auth, request.order_id)
            .await?;

        // Per-grant availability: a grant missing from the order is unknown;
        // a known grant missing from the eligible set is already claimed.
        let eligible: HashMap<GrantId, (OrderItemId, Money)> = self
            .eligibility
            .eligible_grants_for(&order)
            .await?
            .into_iter()
            .map(|g| (g.grant_id, (g.order_item_id, g.unit_price)))
            .collect();
        let on_order = self.grants_on_order(order.id).await?;

        let return_id = ReturnId::new();
        let mut items = Vec::with_capacity(request.grant_ids.len());
        for grant_id in &request.grant_ids {
            match eligible.get(grant_id) {
                Some((order_item_id, unit_price)) => items.push(ReturnItem {
                    id: ReturnItemId::new(),
                    return_id,
                    order_item_id: *order_item_id,
                    grant_id: *grant_id,
                    unit_price: *unit_price,
                    reason: None,
                }),
                None if on_order.contains(grant_id) => {
                    return Err(EngineError::GrantAlreadyClaimed {
                        grant_id: grant_id.to_string(),
                    })
                }
                None => return Err(EngineError::not_found("grant", grant_id)),
            }
        }

        let prices: Vec<Money> = items.iter().map(|i| i.unit_price).collect();
        let refund = compute_refund(&order, &prices, &self.policy);

        let ret = Return {
            id: return_id,
            order_id: order.id,
            user_id: order.customer_id,
            status: ReturnStatus::Pending,
            reason: reason.to_string(),
            refund_amount: refund.monetary_refund,
            refund_method: RefundMethod::default(),
            admin_notes: request.notes,
            created_at: Utc::now(),
            processed_at: None,
            items,
        };

        self.store.insert_return(&ret).await?;
        info!(return_id = %ret.id, refund_amount = ret.refund_amount, "return created");
        Ok(ret)
    }

    /// Operator decision: approve (signal intent, no money moves yet) or
    /// reject (terminal, frees the grants). Legal only from `pending`.
    #[instrument(skip(self, auth, admin_notes), fields(return_id = %id))]
    pub async fn decide(
        &self,
        auth: &AuthContext,
        id: ReturnId,
        decision: Decision,
        admin_notes: Option<String>,
        refund_method: Option<RefundMethod>,
    ) -> Result<Return> {
        require_operator(auth)?;

        let to = match decision {
            Decision::Approve => ReturnStatus::Approved,
            Decision::Reject => ReturnStatus::Rejected,
        };

        let ret = self
            .store
            .transition(
                id,
                &[ReturnStatus::Pending],
                TransitionUpdate {
                    to,
                    admin_notes,
                    refund_method,
                    processed_at: Some(Utc::now()),
                },
            )
            .await?;

        info!(status = %ret.status, "return decided");
        self.notify(&ret);
        Ok(ret)
    }

    /// Execute the monetary and points side effects of an approved return.
    ///
    /// Idempotent: finalizing an already-refunded return is a no-op that
    /// returns the stored result, so a retry never issues credit twice.
    #[instrument(skip(self, auth), fields(return_id = %id))]
    pub async fn finalize(&self, auth: &AuthContext, id: ReturnId) -> Result<Return> {
        require_operator(auth)?;

        let current = self
            .store
            .get_return(id)
            .await?
            .ok_or_else(|| EngineError::not_found("return", id))?;

        match current.status {
            ReturnStatus::Refunded => return Ok(current),
            ReturnStatus::Approved => {}
            from => {
                return Err(EngineError::InvalidTransition {
                    return_id: id.to_string(),
                    from,
                    to: ReturnStatus::Refunded,
                })
            }
        }

        // Points are recomputed against the live order rather than trusted
        // from creation time, so an unapplied discrepancy cannot leak into
        // the ledger. The monetary amount stays authoritative as stored.
        let order = self
            .orders
            .get_order(current.order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("order", current.order_id))?;
        let prices: Vec<Money> = current.items.iter().map(|i| i.unit_price).collect();
        let refund = compute_refund(&order, &prices, &self.policy);

        let receipt = self
            .wallet
            .issue_store_credit(current.user_id, current.refund_amount, current.id)
            .await?;
        info!(receipt_id = %receipt.receipt_id, amount = receipt.amount, "store credit issued");

        let ledger_entry = (refund.points_to_refund > 0).then(|| {
            NewLedgerEntry::refund(
                current.user_id,
                refund.points_to_refund,
                current.order_id,
                current.id,
            )
        });

        let ret = self.store.commit_refund(id, Utc::now(), ledger_entry).await?;
        info!(points = refund.points_to_refund, "return refunded");
        self.notify(&ret);
        Ok(ret)
    }

    /// Cancel a return. Legal from `pending` or `approved`, only for the
    /// original requester or an operator.
    #[instrument(skip(self, auth), fields(return_id = %id))]
    pub async fn cancel(&self, auth: &AuthContext, id: ReturnId) -> Result<Return> {
        let current = self
            .store
            .get_return(id)
            .await?
            .ok_or_else(|| EngineError::not_found("return", id))?;

        if !auth.is_operator() && current.user_id != auth.user_id {
            return Err(EngineError::Forbidden(
                "only the requester or an operator may cancel a return".into(),
            ));
        }

        let ret = self
            .store
            .transition(
                id,
                &[ReturnStatus::Pending, ReturnStatus::Approved],
                TransitionUpdate {
                    to: ReturnStatus::Cancelled,
                    admin_notes: None,
                    refund_method: None,
                    processed_at: Some(Utc::now()),
                },
            )
            .await?;

        info!("return cancelled");
        self.notify(&ret);
        Ok(ret)
    }

    /// Ownership-checked read.
    pub async fn get(&self, auth: &AuthContext, id: ReturnId) -> Result<Return> {
        let ret = self
            .store
            .get_return(id)
            .await?
            .ok_or_else(|| EngineError::not_found("return", id))?;

        if !auth.is_operator() && ret.user_id != auth.user_id {
            return Err(EngineError::Forbidden(
                "return belongs to another customer".into(),
            ));
        }
        Ok(ret)
    }

    /// The caller's own returns, optionally filtered by status.
    pub async fn list_mine(
        &self,
        auth: &AuthContext,
        status: Option<ReturnStatus>,
        page: Page,
    ) -> Result<PageResult<Return>> {
        self.store
            .list(&ReturnQuery {
                filter: ReturnFilter {
                    user_id: Some(auth.user_id),
                    status,
                    ..Default::default()
                },
                page,
            })
            .await
    }

    async fn grants_on_order(&self, order_id: OrderId) -> Result<std::collections::HashSet<GrantId>> {
        let items = self.orders.get_order_items(order_id).await?;
        Ok(items
            .into_iter()
            .flat_map(|i| i.grants.into_iter().map(|g| g.id))
            .collect())
    }

    fn notify(&self, ret: &Return) {
        if let Some(event) = ReturnEvent::for_status(ret.status) {
            self.dispatcher.dispatch(Notification {
                user_id: ret.user_id,
                return_id: ret.id,
                order_id: ret.order_id,
                event,
                refund_amount: ret.refund_amount,
            });
        }
    }
}
