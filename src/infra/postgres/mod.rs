//! PostgreSQL implementations of the engine's storage traits.

mod order_service;
mod points_ledger;
mod returns_store;
mod wallet;

pub use order_service::PgOrderService;
pub use points_ledger::PgPointsLedger;
pub use returns_store::PgReturnsStore;
pub use wallet::PgWalletService;
