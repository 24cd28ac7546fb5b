//! Storage ports
//!
//! The transaction engine and query service talk to storage only through
//! these traits. `LedgerStore` opens units of work and serves read-side
//! queries; `UnitOfWork` is one atomic unit.
//!
//! A unit that is dropped without a successful [`UnitOfWork::commit`] rolls
//! back: nothing it wrote becomes visible and every row lock it holds is
//! released.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Balance, CreditEntry, EmployeeSummary, InventoryLine, MerchItem, NewUser, Price,
    PurchaseEntry, ReceivedTransfer, SentTransfer, TransferEntry, User, Wallet,
};

pub use error::{StoreError, MERCH_NAME_KEY, USERS_EMAIL_KEY, USERS_USERNAME_KEY};
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// One atomic unit of reads and writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&mut self, username: &str)
        -> Result<Option<User>, StoreError>;

    async fn username_taken(&mut self, username: &str) -> Result<bool, StoreError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<User, StoreError>;

    async fn insert_wallet(&mut self, user_id: Uuid, coins: Balance)
        -> Result<Wallet, StoreError>;

    /// Read a wallet and hold its row lock until the unit ends.
    async fn lock_wallet(&mut self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn set_wallet_balance(&mut self, wallet: &Wallet) -> Result<(), StoreError>;

    /// Point-in-time read of an item; takes no lock.
    async fn find_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError>;

    /// Read an item by name and hold the name's lock until the unit ends.
    async fn lock_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError>;

    async fn insert_merch(&mut self, name: &str, price: Price) -> Result<MerchItem, StoreError>;

    async fn update_merch_price(&mut self, item: &MerchItem) -> Result<(), StoreError>;

    async fn insert_transfer(
        &mut self,
        from_user: Uuid,
        to_user: Uuid,
        amount: i64,
    ) -> Result<TransferEntry, StoreError>;

    async fn insert_purchase(
        &mut self,
        user_id: Uuid,
        merch_id: Uuid,
        price_paid: i64,
    ) -> Result<PurchaseEntry, StoreError>;

    async fn insert_credit(
        &mut self,
        user_id: Uuid,
        credited_by: Uuid,
        amount: i64,
    ) -> Result<CreditEntry, StoreError>;

    /// Make every write of this unit durable and release its locks.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Authoritative store behind the engine and the query service.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    // =========================================================================
    // Read side
    // =========================================================================

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn wallet_of(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Purchased items grouped by name, joined against the catalog.
    async fn inventory_of(&self, user_id: Uuid) -> Result<Vec<InventoryLine>, StoreError>;

    async fn received_by(&self, user_id: Uuid) -> Result<Vec<ReceivedTransfer>, StoreError>;

    async fn sent_by(&self, user_id: Uuid) -> Result<Vec<SentTransfer>, StoreError>;

    async fn list_merch(&self) -> Result<Vec<MerchItem>, StoreError>;

    async fn list_employees(&self) -> Result<Vec<EmployeeSummary>, StoreError>;

    // =========================================================================
    // Token revocation
    // =========================================================================

    async fn revoke_token(&self, fingerprint: &str) -> Result<(), StoreError>;

    async fn is_token_revoked(&self, fingerprint: &str) -> Result<bool, StoreError>;
}
