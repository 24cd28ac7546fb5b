//! Domain Error Types
//!
//! Rejection reasons produced by the transaction engine and query service.

use thiserror::Error;

use super::amount::AmountError;

/// Domain-specific errors
///
/// Each variant is a specific, human-readable reason an operation was
/// rejected. None of them leaves partial writes behind: the unit of work that
/// produced it is rolled back first.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(AmountError),

    #[error("Invalid price: {0}")]
    InvalidPrice(AmountError),

    #[error("Item name must not be empty")]
    InvalidItemName,

    #[error("Email is required")]
    InvalidEmail,

    // Not found
    #[error("Sender wallet not found")]
    SenderWalletNotFound,

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Recipient wallet not found: {0}")]
    RecipientWalletNotFound(String),

    #[error("Buyer not found")]
    BuyerNotFound,

    #[error("Buyer wallet not found")]
    WalletNotFound,

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("No {0} found")]
    NotFound(&'static str),

    // Conflict
    #[error("Cannot transfer coins to yourself")]
    SelfTransferRejected,

    #[error("Item {0} already has this price")]
    NoChange(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    // Persistence
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Operation timed out and was rolled back")]
    Timeout,

    #[error("Request canceled by client")]
    Canceled,
}

/// Coarse classes of [`LedgerError`], one per HTTP status family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientFunds,
    Persistence,
    Canceled,
}

impl LedgerError {
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidPrice(_)
            | Self::InvalidItemName
            | Self::InvalidEmail => ErrorKind::Validation,
            Self::SenderWalletNotFound
            | Self::RecipientNotFound(_)
            | Self::RecipientWalletNotFound(_)
            | Self::BuyerNotFound
            | Self::WalletNotFound
            | Self::ItemNotFound(_)
            | Self::NotFound(_) => ErrorKind::NotFound,
            Self::SelfTransferRejected | Self::NoChange(_) | Self::UserAlreadyExists(_) => {
                ErrorKind::Conflict
            }
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::Persistence(_) | Self::Timeout => ErrorKind::Persistence,
            Self::Canceled => ErrorKind::Canceled,
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidPrice(_) => "invalid_price",
            Self::InvalidItemName => "invalid_item_name",
            Self::InvalidEmail => "invalid_email",
            Self::SenderWalletNotFound => "sender_wallet_not_found",
            Self::RecipientNotFound(_) => "recipient_not_found",
            Self::RecipientWalletNotFound(_) => "recipient_wallet_not_found",
            Self::BuyerNotFound => "buyer_not_found",
            Self::WalletNotFound => "wallet_not_found",
            Self::ItemNotFound(_) => "item_not_found",
            Self::NotFound(_) => "not_found",
            Self::SelfTransferRejected => "self_transfer_rejected",
            Self::NoChange(_) => "no_change",
            Self::UserAlreadyExists(_) => "user_already_exists",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Persistence(_) => "persistence_failure",
            Self::Timeout => "timeout",
            Self::Canceled => "request_canceled",
        }
    }

    /// Persistence failures are safe to retry from scratch; rejections are not.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}
