//! Integration tests for the Postgres ledger store
//!
//! Skipped unless DATABASE_URL points at a scratch database.

use std::sync::Arc;
use std::time::Duration;

use coin_ledger::cache::{CacheAside, MemoryCache};
use coin_ledger::domain::{LedgerError, OperationContext, User};
use coin_ledger::handlers::{
    EngineContext, LogoutHandler, ProvisionUserCommand, ProvisionUserHandler, ProvisioningPolicy,
    PurchaseCommand, PurchaseHandler, TransferCommand, TransferHandler, UpsertMerchCommand,
    UpsertMerchHandler,
};
use coin_ledger::store::{LedgerStore, PgLedgerStore};
use coin_ledger::Balance;
use tokio_test::{assert_err, assert_ok};

mod common;

fn engine(pool: sqlx::PgPool) -> EngineContext {
    let store = PgLedgerStore::new(pool).with_lock_timeout(Duration::from_secs(2));
    let cache = CacheAside::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    EngineContext::new(Arc::new(store), cache).with_timeout(Duration::from_secs(5))
}

async fn provision(engine: &EngineContext, coins: i64) -> User {
    let policy = ProvisioningPolicy {
        starting_balance: Balance::new(coins).unwrap(),
        ..ProvisioningPolicy::default()
    };
    let email = format!("{}@example.com", common::unique("pg-"));
    ProvisionUserHandler::new(engine.clone(), policy)
        .execute(ProvisionUserCommand::new(email), &OperationContext::new())
        .await
        .unwrap()
        .user
}

async fn coins(engine: &EngineContext, user: &User) -> i64 {
    engine
        .store()
        .wallet_of(user.id)
        .await
        .unwrap()
        .map(|w| w.coins.value())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_transfer_moves_coins() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let engine = engine(pool);
    let alice = provision(&engine, 100).await;
    let bob = provision(&engine, 50).await;

    let entry = TransferHandler::new(engine.clone())
        .execute(
            TransferCommand::new(alice.id, bob.username.clone(), 30),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(entry.amount, 30);
    assert_eq!(coins(&engine, &alice).await, 70);
    assert_eq!(coins(&engine, &bob).await, 80);

    let received = engine.store().received_by(bob.id).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from_user, alice.username);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overspend_admits_one() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let engine = engine(pool);
    let alice = provision(&engine, 100).await;
    let bob = provision(&engine, 0).await;
    let carol = provision(&engine, 0).await;

    let first = TransferHandler::new(engine.clone());
    let second = TransferHandler::new(engine.clone());
    let ctx_first = OperationContext::new();
    let ctx_second = OperationContext::new();
    let (a, b) = tokio::join!(
        first.execute(
            TransferCommand::new(alice.id, bob.username.clone(), 60),
            &ctx_first
        ),
        second.execute(
            TransferCommand::new(alice.id, carol.username.clone(), 60),
            &ctx_second
        ),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. }))));

    let total = coins(&engine, &alice).await + coins(&engine, &bob).await + coins(&engine, &carol).await;
    assert_eq!(total, 100);
    assert_eq!(coins(&engine, &alice).await, 40);
}

#[tokio::test]
async fn test_purchase_records_price_paid() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let engine = engine(pool.clone());
    let alice = provision(&engine, 100).await;
    let item = common::unique("Mug");

    UpsertMerchHandler::new(engine.clone())
        .execute(UpsertMerchCommand::new(item.clone(), 40), &OperationContext::new())
        .await
        .unwrap();

    let result = PurchaseHandler::new(engine.clone())
        .execute(PurchaseCommand::new(alice.id, item.clone()), &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(result.balance, 60);

    UpsertMerchHandler::new(engine.clone())
        .execute(UpsertMerchCommand::new(item.clone(), 90), &OperationContext::new())
        .await
        .unwrap();

    let price_paid: i64 = sqlx::query_scalar("SELECT price_paid FROM purchases WHERE user_id = $1")
        .bind(alice.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(price_paid, 40);

    let inventory = engine.store().inventory_of(alice.id).await.unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].item, item);
    assert_eq!(inventory[0].quantity, 1);
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let engine = engine(pool);
    let email = format!("{}@example.com", common::unique("dup-"));
    let handler = ProvisionUserHandler::new(engine.clone(), ProvisioningPolicy::default());

    assert_ok!(
        handler
            .execute(ProvisionUserCommand::new(email.clone()), &OperationContext::new())
            .await
    );
    let err = assert_err!(
        handler
            .execute(ProvisionUserCommand::new(email.clone()), &OperationContext::new())
            .await
    );

    assert_eq!(err, LedgerError::UserAlreadyExists(email));
}

#[tokio::test]
async fn test_token_revocation_is_idempotent() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let engine = engine(pool);
    let token = common::unique("token-");
    let handler = LogoutHandler::new(engine);

    assert!(!handler.is_revoked(&token).await.unwrap());
    assert_ok!(handler.execute(&token, &OperationContext::new()).await);
    assert_ok!(handler.execute(&token, &OperationContext::new()).await);
    assert!(handler.is_revoked(&token).await.unwrap());
}
