//! Redis cache backend over a bb8 connection pool

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::{bb8, redis, RedisConnectionManager};

use super::{CacheError, CacheStore};

#[derive(Clone)]
pub struct RedisCache {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl RedisCache {
    /// Build a pool and check that the server answers.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let manager =
            RedisConnectionManager::new(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let pool = bb8::Pool::builder()
            .connection_timeout(Duration::from_secs(2))
            .build(manager)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let cache = Self { pool };
        cache.ping().await?;
        Ok(cache)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(())
    }

    async fn connection(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(())
    }
}
