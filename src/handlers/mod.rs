//! Command Handlers module
//!
//! The transaction engine: every money-moving operation runs as one unit of
//! work through these handlers.

mod commands;
mod credit_handler;
mod engine;
mod merch_handler;
mod purchase_handler;
mod transfer_handler;
mod user_handler;


pub use commands::*;
pub use credit_handler::AdminCreditHandler;
pub use engine::{Committed, EngineContext, DEFAULT_OPERATION_TIMEOUT};
pub use merch_handler::UpsertMerchHandler;
pub use purchase_handler::PurchaseHandler;
pub use transfer_handler::TransferHandler;
pub use user_handler::{
    generate_username, token_fingerprint, LogoutHandler, ProvisionUserHandler,
    ProvisioningPolicy, DEFAULT_ADMIN_EMAIL, DEFAULT_STARTING_BALANCE,
};
