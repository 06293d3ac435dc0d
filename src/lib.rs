//! Keymarket Returns
//!
//! Returns lifecycle and points reconciliation engine for the license key
//! marketplace: eligibility checks, proportional refunds, an append-only
//! loyalty points ledger, and the return state machine behind them.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (orders, returns, ledger, refund math)
//! - [`engine`] - Business services (eligibility, state machine, admin)
//! - [`infra`] - Infrastructure (storage traits, PostgreSQL, retry)
//! - [`auth`] - Authentication (API keys, roles)
//! - [`notify`] - Customer notification dispatch
//! - [`api`] - REST API routes

pub mod api;
pub mod auth;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod migrations;
pub mod notify;
pub mod server;

// Re-export commonly used types
pub use domain::{
    compute_refund, GrantId, Money, Order, OrderId, Points, RefundPolicy, RefundResult, Return,
    ReturnId, ReturnStatus, UserId,
};

pub use infra::{
    EngineError, OrderService, PointsLedger, Result, ReturnsStore, WalletService,
};
