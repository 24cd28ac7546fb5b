//! Load Testing Tool
//!
//! Hammers concurrent transfers against Postgres and checks that the total
//! number of coins is unchanged afterwards.
//!
//! Run with: cargo run --bin load_test --release -- --users 20 --transfers 2000

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use coin_ledger::cache::{CacheAside, MemoryCache};
use coin_ledger::config::ConfigError;
use coin_ledger::handlers::{
    EngineContext, ProvisionUserCommand, ProvisionUserHandler, ProvisioningPolicy,
    TransferCommand, TransferHandler,
};
use coin_ledger::store::PgLedgerStore;
use coin_ledger::{db, Config, LedgerError, OperationContext};

fn arg_or(args: &[String], flag: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

async fn total_coins(pool: &sqlx::PgPool) -> anyhow::Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(coins), 0)::BIGINT FROM wallets")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let user_count = arg_or(&args, "--users", 20).max(2);
    let transfer_count = arg_or(&args, "--transfers", 2000);

    let config = Config::from_env()?;
    let database_url = config
        .database_url
        .clone()
        .ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

    println!("Load Test - {transfer_count} transfers between {user_count} employees");
    println!("Connecting to database...");

    let pool = db::connect(&config, &database_url).await?;
    db::run_migrations(&pool).await?;

    let store = PgLedgerStore::new(pool.clone()).with_lock_timeout(config.operation_timeout);
    let cache = CacheAside::new(Arc::new(MemoryCache::new()), config.cache_ttl);
    let engine =
        EngineContext::new(Arc::new(store), cache).with_timeout(config.operation_timeout);

    let provisioner = ProvisionUserHandler::new(engine.clone(), ProvisioningPolicy::default());
    let context = OperationContext::new();
    let run_id = uuid::Uuid::new_v4().simple().to_string();

    let mut employees = Vec::with_capacity(user_count);
    for i in 0..user_count {
        let email = format!("load-{run_id}-{i}@example.com");
        let result = provisioner
            .execute(ProvisionUserCommand::new(email), &context)
            .await?;
        employees.push((result.user.id, result.user.username));
    }

    let before = total_coins(&pool).await?;

    let plan: Vec<TransferCommand> = {
        let mut rng = rand::thread_rng();
        (0..transfer_count)
            .map(|_| {
                let from = rng.gen_range(0..user_count);
                let mut to = rng.gen_range(0..user_count - 1);
                if to >= from {
                    to += 1;
                }
                TransferCommand::new(employees[from].0, employees[to].1.clone(), rng.gen_range(1..=200))
            })
            .collect()
    };

    let start = Instant::now();
    let tasks: Vec<_> = plan
        .into_iter()
        .map(|command| {
            let handler = TransferHandler::new(engine.clone());
            tokio::spawn(async move { handler.execute(command, &OperationContext::new()).await })
        })
        .collect();

    let (mut succeeded, mut insufficient, mut failed) = (0u64, 0u64, 0u64);
    for task in tasks {
        match task.await? {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
            Err(e) => {
                failed += 1;
                eprintln!("Transfer failed: {e}");
            }
        }
    }
    let elapsed = start.elapsed();

    let after = total_coins(&pool).await?;
    let rate = succeeded as f64 / elapsed.as_secs_f64();

    println!("\n=== Load Test Results ===");
    println!("Transfers: {transfer_count}");
    println!("Succeeded: {succeeded}");
    println!("Insufficient funds: {insufficient}");
    println!("Failed: {failed}");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {rate:.0} transfers/sec");
    println!("Coins before: {before}, after: {after}");

    pool.close().await;

    if before != after {
        return Err(anyhow::anyhow!(
            "conservation violated: {before} coins before, {after} after"
        ));
    }
    println!("Conservation holds");

    Ok(())
}
