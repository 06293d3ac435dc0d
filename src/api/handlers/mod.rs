//! HTTP handlers, grouped by surface.

pub mod admin;
pub mod eligibility;
pub mod health;
pub mod points;
pub mod returns;
