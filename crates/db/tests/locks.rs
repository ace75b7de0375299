//! Integration tests for the distributed lock manager.
//!
//! Exercises the lock store against a real database:
//! - Acquire, release, and ownership-checked release
//! - Expiry, reaping, and liveness after a holder vanishes
//! - Retry budget exhaustion
//! - Mutual exclusion under concurrent contention
//! - Guaranteed release from `with_lock` on both exit paths

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use latch_core::error::CoreError;
use latch_core::locking::LockConfig;
use latch_db::locks::LockManager;
use latch_db::repositories::LockRepo;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Tight tuning so contention tests fail fast instead of waiting out
/// the production budget.
fn fast_config() -> LockConfig {
    LockConfig {
        timeout: Duration::from_secs(5),
        max_retries: 2,
        retry_delay: Duration::from_millis(20),
    }
}

// ---------------------------------------------------------------------------
// Acquire / release
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn acquire_then_release(pool: PgPool) {
    let locks = LockManager::with_defaults(pool.clone());
    assert_eq!(locks.config().max_retries, 10);

    let owner = locks.acquire("user:1").await.unwrap();
    let record = LockRepo::find(&pool, "user:1").await.unwrap().unwrap();
    assert_eq!(record.lock_owner, owner);

    assert!(locks.release("user:1", owner).await.unwrap());
    assert!(LockRepo::find(&pool, "user:1").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_requires_matching_owner(pool: PgPool) {
    let locks = LockManager::with_defaults(pool.clone());

    let owner = locks.acquire("user:1").await.unwrap();
    let stranger = uuid::Uuid::new_v4();

    assert!(!locks.release("user:1", stranger).await.unwrap());
    // Still held by the rightful owner.
    let record = LockRepo::find(&pool, "user:1").await.unwrap().unwrap();
    assert_eq!(record.lock_owner, owner);

    assert!(locks.release("user:1", owner).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn distinct_keys_do_not_contend(pool: PgPool) {
    let locks = LockManager::new(pool, fast_config());

    let a = locks.acquire("user:1").await.unwrap();
    let b = locks.acquire("user:2").await.unwrap();

    assert!(locks.release("user:1", a).await.unwrap());
    assert!(locks.release("user:2", b).await.unwrap());
}

// ---------------------------------------------------------------------------
// Contention, expiry, reaping
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn contended_acquire_fails_after_retry_budget(pool: PgPool) {
    let locks = LockManager::new(pool, fast_config());

    let owner = locks.acquire("wallet:0xabc").await.unwrap();

    let err = locks.acquire("wallet:0xabc").await.unwrap_err();
    assert_matches!(
        err,
        CoreError::LockAcquisitionFailed { ref key, attempts } if key == "wallet:0xabc" && attempts == 3
    );

    assert!(locks.release("wallet:0xabc", owner).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_lock_is_reaped_by_next_contender(pool: PgPool) {
    // Holder acquires with a 100ms lifetime and never releases.
    let holder = LockManager::new(
        pool.clone(),
        LockConfig {
            timeout: Duration::from_millis(100),
            ..fast_config()
        },
    );
    let dead_owner = holder.acquire("user:42").await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    // A contender retrying on the normal schedule reaps the expired
    // row and acquires without manual intervention.
    let contender = LockManager::new(pool.clone(), fast_config());
    let new_owner = contender.acquire("user:42").await.unwrap();
    assert_ne!(new_owner, dead_owner);

    // The dead holder can no longer release what it lost.
    assert!(!contender.release("user:42", dead_owner).await.unwrap());
    assert!(contender.release("user:42", new_owner).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn renew_extends_live_lock_but_not_dead_one(pool: PgPool) {
    let locks = LockManager::new(
        pool.clone(),
        LockConfig {
            timeout: Duration::from_millis(200),
            ..fast_config()
        },
    );

    let owner = locks.acquire("session:1:web").await.unwrap();
    assert!(locks
        .renew("session:1:web", owner, Duration::from_secs(5))
        .await
        .unwrap());

    // A wrong owner cannot renew.
    assert!(!locks
        .renew("session:1:web", uuid::Uuid::new_v4(), Duration::from_secs(5))
        .await
        .unwrap());
    assert!(locks.release("session:1:web", owner).await.unwrap());

    // An expired lock is never revived by renew.
    let short = locks.acquire("session:2:web").await.unwrap();
    sqlx::query("UPDATE distributed_locks SET expires_at = NOW() - INTERVAL '1 second'")
        .execute(&pool)
        .await
        .unwrap();
    assert!(!locks
        .renew("session:2:web", short, Duration::from_secs(5))
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reap_all_expired_clears_only_dead_rows(pool: PgPool) {
    let locks = LockManager::with_defaults(pool.clone());

    let live = locks.acquire("user:1").await.unwrap();
    locks.acquire("user:2").await.unwrap();
    sqlx::query("UPDATE distributed_locks SET expires_at = NOW() - INTERVAL '1 second' WHERE lock_key = 'user:2'")
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(LockRepo::reap_all_expired(&pool).await.unwrap(), 1);
    let record = LockRepo::find(&pool, "user:1").await.unwrap().unwrap();
    assert_eq!(record.lock_owner, live);
    assert!(LockRepo::find(&pool, "user:2").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// with_lock
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn with_lock_releases_on_success(pool: PgPool) {
    let locks = LockManager::new(pool.clone(), fast_config());

    let value = locks
        .with_lock("user:7", || async { Ok(41 + 1) })
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert!(LockRepo::find(&pool, "user:7").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn with_lock_releases_on_error_path(pool: PgPool) {
    let locks = LockManager::new(pool.clone(), fast_config());

    let result: Result<(), CoreError> = locks
        .with_lock("user:7", || async {
            Err(CoreError::Validation("boom".to_string()))
        })
        .await;
    assert_matches!(result, Err(CoreError::Validation(_)));

    // The lock is free again immediately, not only after expiry.
    assert!(LockRepo::find(&pool, "user:7").await.unwrap().is_none());
    let owner = locks.acquire("user:7").await.unwrap();
    assert!(locks.release("user:7", owner).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn with_lock_surfaces_acquisition_failure(pool: PgPool) {
    let locks = LockManager::new(pool.clone(), fast_config());
    let owner = locks.acquire("user:9").await.unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_inner = Arc::clone(&ran);
    let result: Result<(), CoreError> = locks
        .with_lock("user:9", || async move {
            ran_inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    // The critical section never ran: zero side effects.
    assert_matches!(result, Err(CoreError::LockAcquisitionFailed { .. }));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(locks.release("user:9", owner).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mutual_exclusion_under_contention(pool: PgPool) {
    // Eight tasks repeatedly enter the same critical section; at most
    // one may ever be inside at once.
    let locks = Arc::new(LockManager::new(
        pool,
        LockConfig {
            timeout: Duration::from_secs(5),
            max_retries: 50,
            retry_delay: Duration::from_millis(10),
        },
    ));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                locks
                    .with_lock("user:contended", || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
