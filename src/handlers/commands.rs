//! Command definitions
//!
//! Commands represent intentions to change the ledger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{MerchItem, User, Wallet};

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to move coins from one employee to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Authenticated sender
    pub sender_id: Uuid,
    /// Recipient handle
    pub recipient: String,
    /// Coins to move, validated by the handler
    pub amount: u64,
}

impl TransferCommand {
    pub fn new(sender_id: Uuid, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            sender_id,
            recipient: recipient.into(),
            amount,
        }
    }
}

// =========================================================================
// PurchaseCommand
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCommand {
    pub buyer_id: Uuid,
    pub item: String,
}

impl PurchaseCommand {
    pub fn new(buyer_id: Uuid, item: impl Into<String>) -> Self {
        Self {
            buyer_id,
            item: item.into(),
        }
    }
}

// =========================================================================
// AdminCreditCommand
// =========================================================================

/// Command to add coins to an employee's wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCreditCommand {
    pub admin_id: Uuid,
    pub recipient: String,
    pub amount: u64,
}

impl AdminCreditCommand {
    pub fn new(admin_id: Uuid, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            admin_id,
            recipient: recipient.into(),
            amount,
        }
    }
}

// =========================================================================
// UpsertMerchCommand
// =========================================================================

/// Command to create a catalog item or change its price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertMerchCommand {
    pub name: String,
    pub price: u64,
}

impl UpsertMerchCommand {
    pub fn new(name: impl Into<String>, price: u64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

// =========================================================================
// ProvisionUserCommand
// =========================================================================

/// Command issued by the identity service on a user's first sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionUserCommand {
    pub email: String,
    pub credential_hash: String,
}

impl ProvisionUserCommand {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            credential_hash: String::new(),
        }
    }

    pub fn with_credential_hash(mut self, credential_hash: impl Into<String>) -> Self {
        self.credential_hash = credential_hash.into();
        self
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of a successful purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub balance: i64,
    pub item: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Result of a successful catalog upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertMerchResult {
    pub outcome: UpsertOutcome,
    pub item: MerchItem,
}

/// Result of a successful provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionUserResult {
    pub user: User,
    pub wallet: Option<Wallet>,
}
