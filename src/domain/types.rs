//! Core identifier and pagination types for the returns engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in whole pesos.
///
/// The storefront prices everything in whole pesos, so integer arithmetic is
/// exact and the refund formula never touches floating point.
pub type Money = i64;

/// Loyalty points amount. Ledger entries are signed: positive = credit,
/// negative = debit.
pub type Points = i64;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Customer identifier (owner of orders, returns, and the points ledger).
    UserId
);
uuid_id!(
    /// Order identifier (assigned by the external order service).
    OrderId
);
uuid_id!(
    /// Order line item identifier.
    OrderItemId
);
uuid_id!(
    /// Product identifier (external catalog).
    ProductId
);
uuid_id!(
    /// License key grant identifier. A grant is one sold key unit, the atomic
    /// object a return targets.
    GrantId
);
uuid_id!(
    /// Return request identifier.
    ReturnId
);
uuid_id!(
    /// Return line item identifier.
    ReturnItemId
);
uuid_id!(
    /// Points ledger entry identifier.
    LedgerEntryId
);

/// Pagination request. Pages are 1-based; `limit` is clamped.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results with the total row count for the filter.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            limit: page.limit,
        }
    }
}
