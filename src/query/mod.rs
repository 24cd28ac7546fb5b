//! Query module
//!
//! Read-only aggregation over the ledger, served through the cache.

mod service;

pub use service::{CoinHistory, QueryService, WalletInfo};
