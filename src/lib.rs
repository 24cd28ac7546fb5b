//! coin_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod cache;
pub mod domain;
pub mod handlers;
pub mod query;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, LedgerError, OperationContext, Price};
pub use error::{AppError, AppResult, ErrorResponse};
