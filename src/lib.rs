//! Artists Heaven marketplace backend
//!
//! Catalog, carts and a hosted-checkout pipeline whose signed callbacks are
//! reconciled into orders, plus ratings, returns, community product
//! submissions with voting, reward cards and a store chatbot. Artists
//! register, get verified by moderators and announce events.
//!
//! ## Layout
//! - [`domain`] aggregates, value objects and events
//! - [`store`] persistence port with Postgres and in-memory backends
//! - [`checkout`] session creation and webhook reconciliation
//! - [`services`] the remaining application services
//! - [`api`] axum routes

pub mod api;
pub mod chatbot;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod services;
pub mod store;

pub use error::{AppError, Result};
