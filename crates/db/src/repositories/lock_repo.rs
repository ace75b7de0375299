//! Repository for the `distributed_locks` table.
//!
//! Raw row operations only; retry, backoff, and scoped acquisition
//! live in [`crate::locks::LockManager`].

use latch_core::types::LockOwner;
use sqlx::PgPool;

use crate::models::lock::LockRecord;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "lock_key, lock_owner, expires_at, created_at";

/// Provides row-level operations for distributed locks.
pub struct LockRepo;

impl LockRepo {
    /// Attempt to insert a lock row for `key` expiring `ttl_ms` from
    /// now. Returns `true` if the row was inserted, `false` if a row
    /// for the key already exists (live or expired).
    pub async fn try_acquire(
        pool: &PgPool,
        key: &str,
        owner: LockOwner,
        ttl_ms: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO distributed_locks (lock_key, lock_owner, expires_at)
             VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 millisecond'))
             ON CONFLICT (lock_key) DO NOTHING",
        )
        .bind(key)
        .bind(owner)
        .bind(ttl_ms)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the row for `key` if its expiry has passed (reaping).
    /// Returns `true` if an expired row was deleted.
    pub async fn reap_expired(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM distributed_locks WHERE lock_key = $1 AND expires_at <= NOW()",
        )
        .bind(key)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the row only if both key and owner match, so a process
    /// never releases a lock that expired and was re-acquired by
    /// another process. Returns whether a row was actually deleted.
    pub async fn release(
        pool: &PgPool,
        key: &str,
        owner: LockOwner,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND lock_owner = $2")
                .bind(key)
                .bind(owner)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Extend the expiry of a still-live lock by `extension_ms` from
    /// now. Same ownership check as release; an already-expired row is
    /// never revived.
    pub async fn renew(
        pool: &PgPool,
        key: &str,
        owner: LockOwner,
        extension_ms: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE distributed_locks
             SET expires_at = NOW() + ($3 * INTERVAL '1 millisecond')
             WHERE lock_key = $1 AND lock_owner = $2 AND expires_at > NOW()",
        )
        .bind(key)
        .bind(owner)
        .bind(extension_ms)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find the current row for a key, live or expired.
    pub async fn find(pool: &PgPool, key: &str) -> Result<Option<LockRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM distributed_locks WHERE lock_key = $1");
        sqlx::query_as::<_, LockRecord>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Delete every expired lock row. Returns the count of deleted rows.
    pub async fn reap_all_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM distributed_locks WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
