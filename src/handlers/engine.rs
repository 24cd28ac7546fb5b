//! Unit-of-work runner shared by every command handler
//!
//! A unit runs on its own task, bounded by the operation timeout. The caller
//! going away never aborts a unit mid-way; the timeout does, and dropping the
//! unit rolls it back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheAside, CacheKey};
use crate::domain::{LedgerError, OperationContext};
use crate::store::{LedgerStore, UnitOfWork};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Value produced by a committed unit, with the cache keys it made stale.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub stale_keys: Vec<CacheKey>,
}

impl<T> Committed<T> {
    pub fn new(value: T, stale_keys: Vec<CacheKey>) -> Self {
        Self { value, stale_keys }
    }
}

/// Store, cache and limits injected into every handler
#[derive(Clone)]
pub struct EngineContext {
    store: Arc<dyn LedgerStore>,
    cache: CacheAside,
    timeout: Duration,
}

impl EngineContext {
    pub fn new(store: Arc<dyn LedgerStore>, cache: CacheAside) -> Self {
        Self {
            store,
            cache,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheAside {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `work` inside one unit of work.
    ///
    /// `work` owns the unit and must commit it; returning early drops the
    /// unit and rolls it back. After a commit the stale keys are deleted from
    /// the cache before the value is handed back.
    pub async fn run_unit<T, F, Fut>(
        &self,
        operation: &'static str,
        context: &OperationContext,
        work: F,
    ) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(Box<dyn UnitOfWork>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Committed<T>, LedgerError>> + Send + 'static,
    {
        if context.is_cancelled() {
            tracing::debug!(operation, "Caller canceled before unit start");
            return Err(LedgerError::Canceled);
        }

        let store = Arc::clone(&self.store);
        let cache = self.cache.clone();
        let timeout = self.timeout;
        let correlation_id = context.correlation_id;

        let task = tokio::spawn(async move {
            let attempt = async move {
                let unit = store.begin().await?;
                work(unit).await
            };

            let committed = match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        operation,
                        ?correlation_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Unit of work timed out, rolled back"
                    );
                    return Err(LedgerError::Timeout);
                }
            };

            cache.invalidate(&committed.stale_keys).await;
            Ok(committed.value)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(operation, error = %e, "Unit of work task failed");
                Err(LedgerError::Persistence(format!("{operation} task failed")))
            }
        }
    }
}
