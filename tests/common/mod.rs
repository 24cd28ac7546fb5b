//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use coin_ledger::api::{build_router, AppState};
use coin_ledger::cache::MemoryCache;
use coin_ledger::domain::{Balance, Price, Role, User};
use coin_ledger::store::MemoryLedgerStore;
use coin_ledger::Config;

/// Router over the in-memory store and cache, with handles for seeding
pub struct TestApp {
    pub router: Router,
    pub store: MemoryLedgerStore,
    pub cache: MemoryCache,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::from_lookup(|_| None).expect("default config");
        let store = MemoryLedgerStore::new();
        let cache = MemoryCache::new();

        let state = AppState::new(Arc::new(store.clone()), Arc::new(cache.clone()), &config);

        Self {
            router: build_router(state),
            store,
            cache,
        }
    }

    pub fn employee(&self, username: &str, coins: i64) -> User {
        self.store
            .seed_user(
                username,
                &format!("{username}@example.com"),
                Role::Employee,
                Balance::new(coins).unwrap(),
            )
            .unwrap()
    }

    pub fn admin(&self, username: &str) -> User {
        self.store
            .seed_user(
                username,
                &format!("{username}@example.com"),
                Role::Admin,
                Balance::zero(),
            )
            .unwrap()
    }

    pub fn merch(&self, name: &str, price: u64) {
        self.store
            .seed_merch(name, Price::new(price).unwrap())
            .unwrap();
    }

    /// Send one request and decode the body as JSON, or as a JSON string
    /// when it is plain text
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, Value) {
        self.send(request("GET", uri, user, None)).await
    }

    pub async fn post(&self, uri: &str, user: Option<Uuid>, body: Value) -> (StatusCode, Value) {
        self.send(request("POST", uri, user, Some(body))).await
    }
}

pub fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-Request-User-Id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Connect and migrate the test database. `None` when `DATABASE_URL` is
/// unset, so Postgres tests skip instead of failing.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    coin_ledger::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// Suffix that keeps rows from concurrent tests apart
pub fn unique(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}
