//! Infrastructure: errors, storage traits, PostgreSQL implementations, and
//! the conflict retry helper.

pub mod error;
pub mod postgres;
pub mod retry;
pub mod traits;

pub use error::{EngineError, Result};
pub use postgres::{PgOrderService, PgPointsLedger, PgReturnsStore, PgWalletService};
pub use retry::ConflictRetry;
pub use traits::{CreditReceipt, OrderService, PointsLedger, ReturnsStore, WalletService};

#[cfg(test)]
pub use traits::{MockOrderService, MockPointsLedger, MockReturnsStore, MockWalletService};
