//! In-memory ledger store
//!
//! Committed state lives behind one `RwLock`. A unit of work stages its
//! writes privately (reading its own writes back) and applies them under the
//! write lock on commit. Row locks are per-entity async mutexes, keyed by
//! wallet owner and by item name, held until the unit commits or is dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    Balance, CreditEntry, EmployeeSummary, InventoryLine, MerchItem, NewUser, Price,
    PurchaseEntry, ReceivedTransfer, Role, SentTransfer, TransferEntry, User, Wallet,
};

use super::{
    LedgerStore, StoreError, UnitOfWork, MERCH_NAME_KEY, USERS_EMAIL_KEY, USERS_USERNAME_KEY,
};

const WALLETS_USER_KEY: &str = "wallets_user_id_key";

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    /// Keyed by owning user
    wallets: HashMap<Uuid, Wallet>,
    /// Keyed by name, so listings come out ordered
    merch: BTreeMap<String, MerchItem>,
    transfers: Vec<TransferEntry>,
    purchases: Vec<PurchaseEntry>,
    credits: Vec<CreditEntry>,
    revoked_tokens: HashSet<String>,
}

impl MemoryState {
    fn check_user_unique(&self, user: &User) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation(USERS_EMAIL_KEY.to_string()));
        }
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation(USERS_USERNAME_KEY.to_string()));
        }
        Ok(())
    }

    fn username_of(&self, user_id: Uuid) -> Option<String> {
        self.users.get(&user_id).map(|u| u.username.clone())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<MemoryState>,
    wallet_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    merch_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Write number at which the next unit fails; 0 disables
    fail_write: AtomicUsize,
}

/// In-process [`LedgerStore`] for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next unit of work fail on its `nth` write (1-based).
    pub fn inject_write_failure(&self, nth: usize) {
        self.inner.fail_write.store(nth, Ordering::SeqCst);
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Insert a committed user directly. Employees get a wallet holding
    /// `coins`; admins never get one.
    pub fn seed_user(
        &self,
        username: &str,
        email: &str,
        role: Role,
        coins: Balance,
    ) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            role,
            credential_hash: String::new(),
            created_at: Utc::now(),
        };

        let mut state = self.inner.state.write();
        state.check_user_unique(&user)?;
        if role.has_wallet() {
            state.wallets.insert(
                user.id,
                Wallet {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    coins,
                },
            );
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn seed_merch(&self, name: &str, price: Price) -> Result<MerchItem, StoreError> {
        let mut state = self.inner.state.write();
        if state.merch.contains_key(name) {
            return Err(StoreError::UniqueViolation(MERCH_NAME_KEY.to_string()));
        }
        let item = MerchItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
        };
        state.merch.insert(item.name.clone(), item.clone());
        Ok(item)
    }

    pub fn balance_of(&self, user_id: Uuid) -> Option<i64> {
        self.inner
            .state
            .read()
            .wallets
            .get(&user_id)
            .map(|w| w.coins.value())
    }

    /// Sum of every wallet balance
    pub fn total_coins(&self) -> i64 {
        self.inner
            .state
            .read()
            .wallets
            .values()
            .map(|w| w.coins.value())
            .sum()
    }

    pub fn transfer_entries(&self) -> Vec<TransferEntry> {
        self.inner.state.read().transfers.clone()
    }

    pub fn purchase_entries(&self) -> Vec<PurchaseEntry> {
        self.inner.state.read().purchases.clone()
    }

    pub fn credit_entries(&self) -> Vec<CreditEntry> {
        self.inner.state.read().credits.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let fail_at = match self.inner.fail_write.swap(0, Ordering::SeqCst) {
            0 => None,
            nth => Some(nth),
        };

        Ok(Box::new(MemoryUnit {
            inner: Arc::clone(&self.inner),
            staged: Staged::default(),
            guards: Vec::new(),
            locked_wallets: HashSet::new(),
            locked_merch: HashSet::new(),
            writes: 0,
            fail_at,
            finished: false,
        }))
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.state.read().users.get(&user_id).cloned())
    }

    async fn wallet_of(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.inner.state.read().wallets.get(&user_id).copied())
    }

    async fn inventory_of(&self, user_id: Uuid) -> Result<Vec<InventoryLine>, StoreError> {
        let state = self.inner.state.read();
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();

        for purchase in state.purchases.iter().filter(|p| p.user_id == user_id) {
            if let Some(item) = state.merch.values().find(|m| m.id == purchase.merch_id) {
                *counts.entry(item.name.clone()).or_default() += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(item, quantity)| InventoryLine { item, quantity })
            .collect())
    }

    async fn received_by(&self, user_id: Uuid) -> Result<Vec<ReceivedTransfer>, StoreError> {
        let state = self.inner.state.read();
        Ok(state
            .transfers
            .iter()
            .filter(|t| t.to_user == user_id)
            .filter_map(|t| {
                state.username_of(t.from_user).map(|from_user| ReceivedTransfer {
                    from_user,
                    amount: t.amount,
                })
            })
            .collect())
    }

    async fn sent_by(&self, user_id: Uuid) -> Result<Vec<SentTransfer>, StoreError> {
        let state = self.inner.state.read();
        Ok(state
            .transfers
            .iter()
            .filter(|t| t.from_user == user_id)
            .filter_map(|t| {
                state.username_of(t.to_user).map(|to_user| SentTransfer {
                    to_user,
                    amount: t.amount,
                })
            })
            .collect())
    }

    async fn list_merch(&self) -> Result<Vec<MerchItem>, StoreError> {
        Ok(self.inner.state.read().merch.values().cloned().collect())
    }

    async fn list_employees(&self) -> Result<Vec<EmployeeSummary>, StoreError> {
        let state = self.inner.state.read();
        let mut employees: Vec<EmployeeSummary> = state
            .users
            .values()
            .filter(|u| u.role == Role::Employee)
            .map(|u| EmployeeSummary {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
            })
            .collect();
        employees.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(employees)
    }

    async fn revoke_token(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.inner
            .state
            .write()
            .revoked_tokens
            .insert(fingerprint.to_string());
        Ok(())
    }

    async fn is_token_revoked(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.inner.state.read().revoked_tokens.contains(fingerprint))
    }
}

// =========================================================================
// Unit of work
// =========================================================================

#[derive(Debug, Default)]
struct Staged {
    users: Vec<User>,
    wallets: HashMap<Uuid, Wallet>,
    merch: HashMap<String, MerchItem>,
    transfers: Vec<TransferEntry>,
    purchases: Vec<PurchaseEntry>,
    credits: Vec<CreditEntry>,
}

struct MemoryUnit {
    inner: Arc<Inner>,
    staged: Staged,
    guards: Vec<OwnedMutexGuard<()>>,
    locked_wallets: HashSet<Uuid>,
    locked_merch: HashSet<String>,
    writes: usize,
    fail_at: Option<usize>,
    finished: bool,
}

impl MemoryUnit {
    fn record_write(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        self.writes += 1;
        if self.fail_at == Some(self.writes) {
            tracing::debug!(write = self.writes, "Injecting write failure");
            return Err(StoreError::Injected(self.writes));
        }
        Ok(())
    }

    fn staged_user(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        if let Some(user) = self.staged.users.iter().find(|u| pred(u)) {
            return Some(user.clone());
        }
        self.inner.state.read().users.values().find(|u| pred(u)).cloned()
    }

    fn current_wallet(&self, user_id: Uuid) -> Option<Wallet> {
        self.staged
            .wallets
            .get(&user_id)
            .copied()
            .or_else(|| self.inner.state.read().wallets.get(&user_id).copied())
    }

    fn current_merch(&self, name: &str) -> Option<MerchItem> {
        self.staged
            .merch
            .get(name)
            .cloned()
            .or_else(|| self.inner.state.read().merch.get(name).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.staged_user(|u| u.id == user_id))
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.staged_user(|u| u.username == username))
    }

    async fn username_taken(&mut self, username: &str) -> Result<bool, StoreError> {
        Ok(self.staged_user(|u| u.username == username).is_some())
    }

    async fn insert_user(&mut self, new_user: NewUser) -> Result<User, StoreError> {
        self.record_write()?;

        let user = User {
            id: new_user.id,
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            credential_hash: new_user.credential_hash,
            created_at: Utc::now(),
        };

        if self.staged_user(|u| u.email == user.email).is_some() {
            return Err(StoreError::UniqueViolation(USERS_EMAIL_KEY.to_string()));
        }
        if self.staged_user(|u| u.username == user.username).is_some() {
            return Err(StoreError::UniqueViolation(USERS_USERNAME_KEY.to_string()));
        }

        self.staged.users.push(user.clone());
        Ok(user)
    }

    async fn insert_wallet(
        &mut self,
        user_id: Uuid,
        coins: Balance,
    ) -> Result<Wallet, StoreError> {
        self.record_write()?;

        if self.current_wallet(user_id).is_some() {
            return Err(StoreError::UniqueViolation(WALLETS_USER_KEY.to_string()));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            coins,
        };
        self.staged.wallets.insert(user_id, wallet);
        Ok(wallet)
    }

    async fn lock_wallet(&mut self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        if !self.locked_wallets.contains(&user_id) {
            let lock = Arc::clone(&self.inner.wallet_locks.entry(user_id).or_default());
            self.guards.push(lock.lock_owned().await);
            self.locked_wallets.insert(user_id);
        }
        Ok(self.current_wallet(user_id))
    }

    async fn set_wallet_balance(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        self.record_write()?;
        self.staged.wallets.insert(wallet.user_id, *wallet);
        Ok(())
    }

    async fn find_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError> {
        Ok(self.current_merch(name))
    }

    async fn lock_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError> {
        if !self.locked_merch.contains(name) {
            let lock = Arc::clone(&self.inner.merch_locks.entry(name.to_string()).or_default());
            self.guards.push(lock.lock_owned().await);
            self.locked_merch.insert(name.to_string());
        }
        Ok(self.current_merch(name))
    }

    async fn insert_merch(&mut self, name: &str, price: Price) -> Result<MerchItem, StoreError> {
        self.record_write()?;

        if self.current_merch(name).is_some() {
            return Err(StoreError::UniqueViolation(MERCH_NAME_KEY.to_string()));
        }

        let item = MerchItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
        };
        self.staged.merch.insert(item.name.clone(), item.clone());
        Ok(item)
    }

    async fn update_merch_price(&mut self, item: &MerchItem) -> Result<(), StoreError> {
        self.record_write()?;
        self.staged.merch.insert(item.name.clone(), item.clone());
        Ok(())
    }

    async fn insert_transfer(
        &mut self,
        from_user: Uuid,
        to_user: Uuid,
        amount: i64,
    ) -> Result<TransferEntry, StoreError> {
        self.record_write()?;
        let entry = TransferEntry {
            id: Uuid::new_v4(),
            from_user,
            to_user,
            amount,
            created_at: Utc::now(),
        };
        self.staged.transfers.push(entry.clone());
        Ok(entry)
    }

    async fn insert_purchase(
        &mut self,
        user_id: Uuid,
        merch_id: Uuid,
        price_paid: i64,
    ) -> Result<PurchaseEntry, StoreError> {
        self.record_write()?;
        let entry = PurchaseEntry {
            id: Uuid::new_v4(),
            user_id,
            merch_id,
            price_paid,
            created_at: Utc::now(),
        };
        self.staged.purchases.push(entry.clone());
        Ok(entry)
    }

    async fn insert_credit(
        &mut self,
        user_id: Uuid,
        credited_by: Uuid,
        amount: i64,
    ) -> Result<CreditEntry, StoreError> {
        self.record_write()?;
        let entry = CreditEntry {
            id: Uuid::new_v4(),
            user_id,
            credited_by,
            amount,
            created_at: Utc::now(),
        };
        self.staged.credits.push(entry.clone());
        Ok(entry)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }

        let staged = std::mem::take(&mut self.staged);
        {
            let mut state = self.inner.state.write();

            // Constraints are re-checked against state committed since staging
            for user in &staged.users {
                state.check_user_unique(user)?;
            }
            for (name, item) in &staged.merch {
                if state.merch.get(name).is_some_and(|m| m.id != item.id) {
                    return Err(StoreError::UniqueViolation(MERCH_NAME_KEY.to_string()));
                }
            }
            for (user_id, wallet) in &staged.wallets {
                if state.wallets.get(user_id).is_some_and(|w| w.id != wallet.id) {
                    return Err(StoreError::UniqueViolation(WALLETS_USER_KEY.to_string()));
                }
            }

            for user in staged.users {
                state.users.insert(user.id, user);
            }
            state.wallets.extend(staged.wallets);
            state.merch.extend(staged.merch);
            state.transfers.extend(staged.transfers);
            state.purchases.extend(staged.purchases);
            state.credits.extend(staged.credits);
        }

        self.finished = true;
        self.guards.clear();
        Ok(())
    }
}
