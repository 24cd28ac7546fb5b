//! Cache Layer
//!
//! Read-through cache in front of the ledger store. The cache is never
//! authoritative: a miss, an undecodable entry or a backend failure all fall
//! through to the store, and the engine deletes affected keys after every
//! commit.

mod memory;
mod redis_cache;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Errors raised by a cache backend
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

/// Key/value cache with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache keys used by the query service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Wallet(Uuid),
    Inventory(Uuid),
    Received(Uuid),
    Sent(Uuid),
    Merch,
    Employees,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Wallet(id) => write!(f, "wallet:{id}"),
            CacheKey::Inventory(id) => write!(f, "inventory:{id}"),
            CacheKey::Received(id) => write!(f, "received:{id}"),
            CacheKey::Sent(id) => write!(f, "sent:{id}"),
            CacheKey::Merch => f.write_str("merch:all"),
            CacheKey::Employees => f.write_str("users:employees"),
        }
    }
}

/// Where a read was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSource::Cache => f.write_str("cache"),
            ReadSource::Store => f.write_str("database"),
        }
    }
}

/// A value tagged with its [`ReadSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ReadSource,
}

/// Values worth caching. Empty results are always re-read from the store.
pub trait CacheValue: Serialize + DeserializeOwned {
    fn is_empty_result(&self) -> bool;
}

impl<T: Serialize + DeserializeOwned> CacheValue for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Serialize + DeserializeOwned> CacheValue for Option<T> {
    fn is_empty_result(&self) -> bool {
        self.is_none()
    }
}

// =========================================================================
// Cache-aside
// =========================================================================

/// Cache-aside reads and post-commit invalidation over a [`CacheStore`].
#[derive(Clone)]
pub struct CacheAside {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CacheAside {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve `key` from the cache, or run `load` and repopulate on a miss.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &CacheKey,
        load: F,
    ) -> Result<Sourced<T>, StoreError>
    where
        T: CacheValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let key = key.to_string();

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %key, source = %ReadSource::Cache, "Cache hit");
                    return Ok(Sourced {
                        value,
                        source: ReadSource::Cache,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, using store");
            }
        }

        let value = load().await?;

        if !value.is_empty_result() {
            match serde_json::to_string(&value) {
                Ok(raw) => {
                    if let Err(e) = self.cache.set(&key, &raw, self.ttl).await {
                        tracing::warn!(key = %key, error = %e, "Cache write failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to encode cache entry");
                }
            }
        }

        tracing::debug!(key = %key, source = %ReadSource::Store, "Cache miss");
        Ok(Sourced {
            value,
            source: ReadSource::Store,
        })
    }

    /// Delete keys after a commit. Failures are logged; the TTL still
    /// bounds staleness.
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        for key in keys {
            let key = key.to_string();
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aside(cache: MemoryCache) -> CacheAside {
        CacheAside::new(Arc::new(cache), Duration::from_secs(300))
    }

    #[test]
    fn test_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            CacheKey::Wallet(id).to_string(),
            "wallet:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(CacheKey::Merch.to_string(), "merch:all");
        assert_eq!(CacheKey::Employees.to_string(), "users:employees");
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = aside(MemoryCache::new());
        let key = CacheKey::Merch;

        let first = cache
            .get_or_load(&key, || async { Ok(vec![1_i64, 2, 3]) })
            .await
            .unwrap();
        assert_eq!(first.source, ReadSource::Store);

        let second: Sourced<Vec<i64>> = cache
            .get_or_load(&key, || async { Ok(vec![]) })
            .await
            .unwrap();
        assert_eq!(second.source, ReadSource::Cache);
        assert_eq!(second.value, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_results_not_cached() {
        let cache = aside(MemoryCache::new());
        let key = CacheKey::Employees;

        let empty: Sourced<Vec<i64>> = cache
            .get_or_load(&key, || async { Ok(vec![]) })
            .await
            .unwrap();
        assert_eq!(empty.source, ReadSource::Store);

        let again: Sourced<Vec<i64>> = cache
            .get_or_load(&key, || async { Ok(vec![7]) })
            .await
            .unwrap();
        assert_eq!(again.source, ReadSource::Store);
        assert_eq!(again.value, vec![7]);
    }

    #[tokio::test]
    async fn test_cache_failure_falls_through() {
        let memory = MemoryCache::new();
        memory.fail_requests(true);
        let cache = aside(memory);

        let read: Sourced<Vec<i64>> = cache
            .get_or_load(&CacheKey::Merch, || async { Ok(vec![5]) })
            .await
            .unwrap();
        assert_eq!(read.source, ReadSource::Store);
        assert_eq!(read.value, vec![5]);

        // Invalidation swallows the failure
        cache.invalidate(&[CacheKey::Merch]).await;
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_reloaded() {
        let memory = MemoryCache::new();
        memory
            .set("merch:all", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = aside(memory);

        let read: Sourced<Vec<i64>> = cache
            .get_or_load(&CacheKey::Merch, || async { Ok(vec![9]) })
            .await
            .unwrap();
        assert_eq!(read.source, ReadSource::Store);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = aside(MemoryCache::new());
        let key = CacheKey::Wallet(Uuid::new_v4());

        cache
            .get_or_load(&key, || async { Ok(Some(100_i64)) })
            .await
            .unwrap();
        cache.invalidate(&[key.clone()]).await;

        let read = cache
            .get_or_load(&key, || async { Ok(Some(70_i64)) })
            .await
            .unwrap();
        assert_eq!(read.source, ReadSource::Store);
        assert_eq!(read.value, Some(70));
    }
}
