//! Database-backed distributed mutual exclusion.
//!
//! The `distributed_locks` table is the only coordination medium
//! between instances; acquisition is an atomic conditional insert, and
//! expiry plus opportunistic reaping bound the damage of any crashed
//! or hung holder. All ordering between critical sections on the same
//! key follows acquisition order.

use std::future::Future;

use latch_core::error::CoreError;
use latch_core::locking::LockConfig;
use latch_core::types::LockOwner;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::map_db_error;
use crate::repositories::LockRepo;

/// Acquire/release/renew/with_lock logic over the lock store.
///
/// Constructed with an injected pool so tests can substitute a test
/// database; lifecycle is process startup to shutdown. Cloning is
/// cheap (the pool is reference-counted).
#[derive(Clone)]
pub struct LockManager {
    pool: PgPool,
    config: LockConfig,
}

impl LockManager {
    pub fn new(pool: PgPool, config: LockConfig) -> Self {
        Self { pool, config }
    }

    /// Manager with default tuning (30s timeout, 10 retries, 300ms
    /// base delay).
    pub fn with_defaults(pool: PgPool) -> Self {
        Self::new(pool, LockConfig::default())
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock for `key` using the manager's configuration.
    pub async fn acquire(&self, key: &str) -> Result<LockOwner, CoreError> {
        self.acquire_with(key, &self.config).await
    }

    /// Acquire the lock for `key` with explicit tuning.
    ///
    /// Retry loop: on contention, first reap any expired row for the
    /// key and retry immediately without consuming a retry slot;
    /// otherwise sleep `retry_delay * attempt` and consume one. The
    /// wait is bounded and sleep-separated, never a spin. Exhausting
    /// the budget yields [`CoreError::LockAcquisitionFailed`] with no
    /// side effects for the caller.
    pub async fn acquire_with(&self, key: &str, config: &LockConfig) -> Result<LockOwner, CoreError> {
        let owner: LockOwner = Uuid::new_v4();
        let ttl_ms = config.timeout.as_millis() as i64;
        let mut attempt: u32 = 0;

        loop {
            let inserted = LockRepo::try_acquire(&self.pool, key, owner, ttl_ms)
                .await
                .map_err(map_db_error)?;
            if inserted {
                tracing::debug!(key, %owner, attempt, "Lock acquired");
                return Ok(owner);
            }

            let reaped = LockRepo::reap_expired(&self.pool, key)
                .await
                .map_err(map_db_error)?;
            if reaped {
                tracing::debug!(key, "Reaped expired lock, retrying immediately");
                continue;
            }

            attempt += 1;
            if attempt > config.max_retries {
                tracing::warn!(key, attempts = attempt, "Lock acquisition failed");
                return Err(CoreError::LockAcquisitionFailed {
                    key: key.to_string(),
                    attempts: attempt,
                });
            }
            tokio::time::sleep(config.backoff_delay(attempt)).await;
        }
    }

    /// Release the lock if `owner` still holds it. Returns `false`
    /// when the lock already expired and was taken by someone else.
    pub async fn release(&self, key: &str, owner: LockOwner) -> Result<bool, CoreError> {
        let released = LockRepo::release(&self.pool, key, owner)
            .await
            .map_err(map_db_error)?;
        if !released {
            tracing::warn!(key, %owner, "Release found no matching lock (expired or stolen)");
        }
        Ok(released)
    }

    /// Extend a still-held lock for long-running critical sections.
    /// Returns `false` if the lock expired or changed hands.
    pub async fn renew(
        &self,
        key: &str,
        owner: LockOwner,
        extension: std::time::Duration,
    ) -> Result<bool, CoreError> {
        LockRepo::renew(&self.pool, key, owner, extension.as_millis() as i64)
            .await
            .map_err(map_db_error)
    }

    /// Run `f` inside the lock for `key`, releasing on every exit path.
    ///
    /// This is the only interface the rest of the system uses; direct
    /// acquire/release calls are an implementation detail. A holder
    /// that never reaches release (process crash) is covered by expiry
    /// and reaping rather than by this function.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        self.with_lock_using(key, &self.config, f).await
    }

    /// [`Self::with_lock`] with explicit tuning.
    pub async fn with_lock_using<T, F, Fut>(
        &self,
        key: &str,
        config: &LockConfig,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let owner = self.acquire_with(key, config).await?;
        let result = f().await;
        // Release on success and failure alike; a release error must
        // not mask the critical section's own result.
        if let Err(err) = self.release(key, owner).await {
            tracing::error!(key, error = %err, "Failed to release lock");
        }
        result
    }
}
