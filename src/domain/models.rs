//! Ledger data model
//!
//! Users, wallets, catalog items and the append-only ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount::{Balance, Price};

/// User role, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Employee => "EMPLOYEE",
        }
    }

    /// Admins hold no wallet
    pub fn has_wallet(&self) -> bool {
        matches!(self, Role::Employee)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "EMPLOYEE" => Ok(Role::Employee),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A user about to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub credential_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub coins: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchItem {
    pub id: Uuid,
    pub name: String,
    pub price: Price,
}

/// One committed peer-to-peer transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEntry {
    pub id: Uuid,
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// One committed purchase. `price_paid` is the price read inside the
/// purchasing unit, so later catalog changes do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub merch_id: Uuid,
    pub price_paid: i64,
    pub created_at: DateTime<Utc>,
}

/// One admin credit. Coins enter circulation here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credited_by: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// =========================================================================
// Read models
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    #[serde(rename = "type")]
    pub item: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedTransfer {
    pub from_user: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTransfer {
    pub to_user: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_wallet_rule() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Employee.to_string(), "EMPLOYEE");
        assert!("MANAGER".parse::<Role>().is_err());
        assert!(!Role::Admin.has_wallet());
        assert!(Role::Employee.has_wallet());
    }

    #[test]
    fn test_history_json_shape() {
        let line = InventoryLine {
            item: "Hat".to_string(),
            quantity: 2,
        };
        let received = ReceivedTransfer {
            from_user: "CoolTiger1234".to_string(),
            amount: 30,
        };

        assert_eq!(
            serde_json::to_value(&line).unwrap(),
            serde_json::json!({"type": "Hat", "quantity": 2})
        );
        assert_eq!(
            serde_json::to_value(&received).unwrap(),
            serde_json::json!({"fromUser": "CoolTiger1234", "amount": 30})
        );
    }

    #[test]
    fn test_user_never_serializes_credential() {
        let user = User {
            id: Uuid::new_v4(),
            username: "BraveWolf4242".to_string(),
            email: "wolf@example.com".to_string(),
            role: Role::Employee,
            credential_hash: "secret".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
