//! Request and response types for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    EligibleGrant, GrantId, OrderId, Page, PointsBalance, RefundMethod, ReturnFilter, ReturnQuery,
    ReturnStatus, UserId,
};
use crate::engine::Decision;

/// Body for `POST /v1/returns`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReturnRequest {
    pub order_id: OrderId,
    pub reason: String,
    /// The license key grants being returned. Must be non-empty and unique.
    pub grant_ids: Vec<GrantId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body for `POST /v1/returns/admin/:id/process`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessReturnRequest {
    pub status: DecisionRequest,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub refund_method: Option<RefundMethod>,
}

/// Operator verdict on a pending return. The short imperative forms are
/// accepted for compatibility with older admin tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DecisionRequest {
    #[serde(rename = "approved", alias = "approve")]
    Approve,
    #[serde(rename = "rejected", alias = "reject")]
    Reject,
}

impl From<DecisionRequest> for Decision {
    fn from(value: DecisionRequest) -> Self {
        match value {
            DecisionRequest::Approve => Decision::Approve,
            DecisionRequest::Reject => Decision::Reject,
        }
    }
}

/// Query string for `GET /v1/returns/my-returns`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MyReturnsQuery {
    #[serde(default)]
    pub status: Option<ReturnStatus>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl MyReturnsQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

/// Query string for `GET /v1/returns/admin/all`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminListQuery {
    #[serde(default)]
    pub status: Option<ReturnStatus>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl From<AdminListQuery> for ReturnQuery {
    fn from(q: AdminListQuery) -> Self {
        ReturnQuery {
            filter: ReturnFilter {
                user_id: q.user_id,
                status: q.status,
                order_id: q.order_id,
                created_from: q.created_from,
                created_to: q.created_to,
            },
            page: Page::new(q.page, q.limit),
        }
    }
}

/// Query string for `GET /v1/points/history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl HistoryQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

/// Response for `GET /v1/returns/eligibility/:order_id`.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityResponse {
    pub order_id: OrderId,
    /// Grants still available for return. Empty when everything on the
    /// order is already claimed.
    pub eligible_grants: Vec<EligibleGrant>,
}

/// Response for `GET /v1/points/balance`.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    #[serde(flatten)]
    pub balance: PointsBalance,
}
