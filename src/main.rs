//! coin_ledger - corporate coin wallet backend
//!
//! Employees hold coin wallets, send coins to each other and spend them on
//! merch. Admins credit coins and manage the catalog.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coin_ledger::api::{self, AppState};
use coin_ledger::cache::{CacheStore, MemoryCache, RedisCache};
use coin_ledger::config::LogFormat;
use coin_ledger::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use coin_ledger::{db, Config};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coin_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Open the ledger store; Postgres when configured, in-memory otherwise
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn LedgerStore>, Option<PgPool>)> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory ledger store");
        return Ok((Arc::new(MemoryLedgerStore::new()), None));
    };

    tracing::info!("Connecting to database...");
    let pool = db::connect(config, database_url).await?;
    db::verify_connection(&pool).await?;

    db::run_migrations(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete after migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    let store = PgLedgerStore::new(pool.clone()).with_lock_timeout(config.operation_timeout);
    Ok((Arc::new(store), Some(pool)))
}

/// Open the cache; an unreachable Redis degrades to the in-process cache
async fn open_cache(config: &Config) -> Arc<dyn CacheStore> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, using the in-process cache");
        return Arc::new(MemoryCache::new());
    };

    match RedisCache::connect(redis_url).await {
        Ok(cache) => {
            tracing::info!("Redis cache connected");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using the in-process cache");
            Arc::new(MemoryCache::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting coin_ledger server");

    let (store, pool) = open_store(&config).await?;
    let cache = open_cache(&config).await;

    let app = api::build_router(AppState::new(store, cache, &config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
