//! PostgreSQL ledger store
//!
//! Each unit of work is one sqlx transaction. Row locks are taken with
//! `SELECT ... FOR UPDATE` and bounded by `SET LOCAL lock_timeout`; dropping
//! the transaction without committing rolls it back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Balance, CreditEntry, EmployeeSummary, InventoryLine, MerchItem, NewUser, Price,
    PurchaseEntry, ReceivedTransfer, Role, SentTransfer, TransferEntry, User, Wallet,
};

use super::{LedgerStore, StoreError, UnitOfWork};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// =========================================================================
// Rows
// =========================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    role: String,
    credential_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(StoreError::Corrupt)?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            role,
            credential_hash: row.credential_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    coins: i64,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let coins = Balance::new(row.coins)
            .map_err(|e| StoreError::Corrupt(format!("wallet {}: {e}", row.id)))?;
        Ok(Wallet {
            id: row.id,
            user_id: row.user_id,
            coins,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MerchRow {
    id: Uuid,
    name: String,
    price: i64,
}

impl From<MerchRow> for MerchItem {
    fn from(row: MerchRow) -> Self {
        MerchItem {
            id: row.id,
            name: row.name,
            price: Price::from_stored(row.price),
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, role, credential_hash, created_at";

// =========================================================================
// Store
// =========================================================================

/// [`LedgerStore`] backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound how long a unit waits for any single row lock
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let set_timeout = format!("SET LOCAL lock_timeout = {}", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        Ok(Box::new(PgUnit { tx: Some(tx) }))
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn wallet_of(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> =
            sqlx::query_as("SELECT id, user_id, coins FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn inventory_of(&self, user_id: Uuid) -> Result<Vec<InventoryLine>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT m.name, COUNT(*)
            FROM purchases p
            JOIN merch m ON m.id = p.merch_id
            WHERE p.user_id = $1
            GROUP BY m.name
            ORDER BY m.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(item, quantity)| InventoryLine { item, quantity })
            .collect())
    }

    async fn received_by(&self, user_id: Uuid) -> Result<Vec<ReceivedTransfer>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT u.username, t.amount
            FROM transfers t
            JOIN users u ON u.id = t.from_user
            WHERE t.to_user = $1
            ORDER BY t.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(from_user, amount)| ReceivedTransfer { from_user, amount })
            .collect())
    }

    async fn sent_by(&self, user_id: Uuid) -> Result<Vec<SentTransfer>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT u.username, t.amount
            FROM transfers t
            JOIN users u ON u.id = t.to_user
            WHERE t.from_user = $1
            ORDER BY t.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(to_user, amount)| SentTransfer { to_user, amount })
            .collect())
    }

    async fn list_merch(&self) -> Result<Vec<MerchItem>, StoreError> {
        let rows: Vec<MerchRow> =
            sqlx::query_as("SELECT id, name, price FROM merch ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(MerchItem::from).collect())
    }

    async fn list_employees(&self) -> Result<Vec<EmployeeSummary>, StoreError> {
        let rows: Vec<(Uuid, String, String)> = sqlx::query_as(
            "SELECT id, username, email FROM users WHERE role = 'EMPLOYEE' ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username, email)| EmployeeSummary {
                id,
                username,
                email,
            })
            .collect())
    }

    async fn revoke_token(&self, fingerprint: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO revoked_tokens (fingerprint) VALUES ($1) ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_token_revoked(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE fingerprint = $1)",
        )
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?;

        Ok(revoked)
    }
}

// =========================================================================
// Unit of work
// =========================================================================

struct PgUnit {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnit {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Finished)
    }
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let tx = self.tx()?;
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let tx = self.tx()?;
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn username_taken(&mut self, username: &str) -> Result<bool, StoreError> {
        let tx = self.tx()?;
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&mut **tx)
                .await?;

        Ok(taken)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        let tx = self.tx()?;
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, username, email, role, credential_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.credential_hash)
        .fetch_one(&mut **tx)
        .await?;

        User::try_from(row)
    }

    async fn insert_wallet(
        &mut self,
        user_id: Uuid,
        coins: Balance,
    ) -> Result<Wallet, StoreError> {
        let tx = self.tx()?;
        let row: WalletRow = sqlx::query_as(
            r#"
            INSERT INTO wallets (id, user_id, coins)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, coins
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(coins.value())
        .fetch_one(&mut **tx)
        .await?;

        Wallet::try_from(row)
    }

    async fn lock_wallet(&mut self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let tx = self.tx()?;
        let row: Option<WalletRow> = sqlx::query_as(
            "SELECT id, user_id, coins FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn set_wallet_balance(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query("UPDATE wallets SET coins = $1 WHERE id = $2")
            .bind(wallet.coins.value())
            .bind(wallet.id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn find_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError> {
        let tx = self.tx()?;
        let row: Option<MerchRow> =
            sqlx::query_as("SELECT id, name, price FROM merch WHERE name = $1")
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(row.map(MerchItem::from))
    }

    async fn lock_merch(&mut self, name: &str) -> Result<Option<MerchItem>, StoreError> {
        let tx = self.tx()?;

        // Serializes upserts of a name that has no row to lock yet
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(name)
            .execute(&mut **tx)
            .await?;

        let row: Option<MerchRow> =
            sqlx::query_as("SELECT id, name, price FROM merch WHERE name = $1 FOR UPDATE")
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(row.map(MerchItem::from))
    }

    async fn insert_merch(&mut self, name: &str, price: Price) -> Result<MerchItem, StoreError> {
        let tx = self.tx()?;
        let row: MerchRow = sqlx::query_as(
            r#"
            INSERT INTO merch (id, name, price)
            VALUES ($1, $2, $3)
            RETURNING id, name, price
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(price.value())
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into())
    }

    async fn update_merch_price(&mut self, item: &MerchItem) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query("UPDATE merch SET price = $1 WHERE id = $2")
            .bind(item.price.value())
            .bind(item.id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn insert_transfer(
        &mut self,
        from_user: Uuid,
        to_user: Uuid,
        amount: i64,
    ) -> Result<TransferEntry, StoreError> {
        let tx = self.tx()?;
        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO transfers (id, from_user, to_user, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(from_user)
        .bind(to_user)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;

        Ok(TransferEntry {
            id,
            from_user,
            to_user,
            amount,
            created_at,
        })
    }

    async fn insert_purchase(
        &mut self,
        user_id: Uuid,
        merch_id: Uuid,
        price_paid: i64,
    ) -> Result<PurchaseEntry, StoreError> {
        let tx = self.tx()?;
        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO purchases (id, user_id, merch_id, price_paid)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(merch_id)
        .bind(price_paid)
        .fetch_one(&mut **tx)
        .await?;

        Ok(PurchaseEntry {
            id,
            user_id,
            merch_id,
            price_paid,
            created_at,
        })
    }

    async fn insert_credit(
        &mut self,
        user_id: Uuid,
        credited_by: Uuid,
        amount: i64,
    ) -> Result<CreditEntry, StoreError> {
        let tx = self.tx()?;
        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO credits (id, user_id, credited_by, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(credited_by)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;

        Ok(CreditEntry {
            id,
            user_id,
            credited_by,
            amount,
            created_at,
        })
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }
}
