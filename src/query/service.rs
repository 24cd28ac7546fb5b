//! Query Service
//!
//! Wallet, inventory and transfer history reads. Every read goes through the
//! cache first and falls back to the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheAside, CacheKey};
use crate::domain::{
    EmployeeSummary, InventoryLine, LedgerError, MerchItem, ReceivedTransfer, SentTransfer,
};
use crate::store::LedgerStore;

/// Transfers into and out of one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistory {
    pub received: Vec<ReceivedTransfer>,
    pub sent: Vec<SentTransfer>,
}

/// Balance, inventory and history of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub coins: i64,
    pub inventory: Vec<InventoryLine>,
    pub coin_history: CoinHistory,
}

/// Query Service for cached reads
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn LedgerStore>,
    cache: CacheAside,
}

impl QueryService {
    pub fn new(store: Arc<dyn LedgerStore>, cache: CacheAside) -> Self {
        Self { store, cache }
    }

    // =========================================================================
    // wallet_info
    // =========================================================================

    /// A user without a wallet reports 0 coins.
    pub async fn wallet_info(&self, user_id: Uuid) -> Result<WalletInfo, LedgerError> {
        let store = &self.store;

        let wallet = self
            .cache
            .get_or_load(&CacheKey::Wallet(user_id), || store.wallet_of(user_id))
            .await?;
        let inventory = self
            .cache
            .get_or_load(&CacheKey::Inventory(user_id), || store.inventory_of(user_id))
            .await?;
        let received = self
            .cache
            .get_or_load(&CacheKey::Received(user_id), || store.received_by(user_id))
            .await?;
        let sent = self
            .cache
            .get_or_load(&CacheKey::Sent(user_id), || store.sent_by(user_id))
            .await?;

        tracing::debug!(
            %user_id,
            wallet = %wallet.source,
            inventory = %inventory.source,
            received = %received.source,
            sent = %sent.source,
            "Wallet info loaded"
        );

        Ok(WalletInfo {
            coins: wallet.value.map(|w| w.coins.value()).unwrap_or(0),
            inventory: inventory.value,
            coin_history: CoinHistory {
                received: received.value,
                sent: sent.value,
            },
        })
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// All catalog items ordered by name
    pub async fn catalog(&self) -> Result<Vec<MerchItem>, LedgerError> {
        let store = &self.store;
        let items = self
            .cache
            .get_or_load(&CacheKey::Merch, || store.list_merch())
            .await?;

        tracing::debug!(count = items.value.len(), source = %items.source, "Catalog loaded");

        if items.value.is_empty() {
            return Err(LedgerError::NotFound("merch"));
        }
        Ok(items.value)
    }

    pub async fn employees(&self) -> Result<Vec<EmployeeSummary>, LedgerError> {
        let store = &self.store;
        let employees = self
            .cache
            .get_or_load(&CacheKey::Employees, || store.list_employees())
            .await?;

        tracing::debug!(
            count = employees.value.len(),
            source = %employees.source,
            "Employees loaded"
        );

        if employees.value.is_empty() {
            return Err(LedgerError::NotFound("employees"));
        }
        Ok(employees.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::{Balance, Price, Role};
    use crate::store::MemoryLedgerStore;
    use std::time::Duration;

    fn service(store: &MemoryLedgerStore) -> QueryService {
        QueryService::new(
            Arc::new(store.clone()),
            CacheAside::new(Arc::new(MemoryCache::new()), Duration::from_secs(300)),
        )
    }

    #[test]
    fn test_wallet_info_json_shape() {
        let info = WalletInfo {
            coins: 20,
            inventory: vec![InventoryLine {
                item: "Hat".to_string(),
                quantity: 1,
            }],
            coin_history: CoinHistory {
                received: vec![],
                sent: vec![SentTransfer {
                    to_user: "bob".to_string(),
                    amount: 30,
                }],
            },
        };

        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({
                "coins": 20,
                "inventory": [{"type": "Hat", "quantity": 1}],
                "coinHistory": {
                    "received": [],
                    "sent": [{"toUser": "bob", "amount": 30}]
                }
            })
        );
    }

    #[tokio::test]
    async fn test_wallet_info_for_user_without_wallet() {
        let store = MemoryLedgerStore::new();
        let admin = store
            .seed_user("root", "root@example.com", Role::Admin, Balance::zero())
            .unwrap();

        let info = service(&store).wallet_info(admin.id).await.unwrap();
        assert_eq!(info.coins, 0);
        assert!(info.inventory.is_empty());
        assert!(info.coin_history.received.is_empty());
    }

    #[tokio::test]
    async fn test_empty_listings_are_not_found() {
        let store = MemoryLedgerStore::new();
        let queries = service(&store);

        assert_eq!(
            queries.catalog().await.unwrap_err(),
            LedgerError::NotFound("merch")
        );
        assert_eq!(
            queries.employees().await.unwrap_err(),
            LedgerError::NotFound("employees")
        );

        store.seed_merch("Pen", Price::new(10).unwrap()).unwrap();
        store.seed_merch("Cup", Price::new(20).unwrap()).unwrap();
        let names: Vec<String> = queries
            .catalog()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Cup", "Pen"]);
    }
}
