//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod models;

pub use amount::{Amount, AmountError, Balance, Price, MAX_AMOUNT, MAX_PRICE};
pub use context::{CancelHandle, CancelOnDrop, OperationContext};
pub use error::{ErrorKind, LedgerError};
pub use models::{
    CreditEntry, EmployeeSummary, InventoryLine, MerchItem, NewUser, PurchaseEntry,
    ReceivedTransfer, Role, SentTransfer, TransferEntry, User, Wallet,
};
