//! Periodic maintenance: session expiry sweep and lock-table hygiene.
//!
//! Spawns a loop on `tokio::time::interval` that marks overdue Active
//! sessions Terminated/`expired` and clears abandoned expired lock
//! rows. Runs until the cancellation token fires. Correctness never
//! depends on this job: contenders reap expired locks inline, and
//! reads already filter on `expires_at`.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::locks::LockManager;
use crate::repositories::LockRepo;
use crate::sessions::SessionService;

/// Default sweep interval: 1 hour.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Run the expiry sweep loop.
///
/// Interval is configurable via `SESSION_SWEEP_INTERVAL_SECS`
/// (default 3600). Runs until `cancel` is triggered.
pub async fn run(pool: PgPool, locks: LockManager, cancel: CancellationToken) {
    let interval_secs: u64 = std::env::var("SESSION_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    tracing::info!(interval_secs, "Expiry sweep job started");

    let sessions = SessionService::new(pool.clone(), locks);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweep job stopping");
                break;
            }
            _ = interval.tick() => {
                match sessions.sweep_expired().await {
                    Ok(expired) if expired > 0 => {
                        tracing::info!(expired, "Expiry sweep: terminated overdue sessions");
                    }
                    Ok(_) => {
                        tracing::debug!("Expiry sweep: no overdue sessions");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Expiry sweep: session sweep failed");
                    }
                }
                match LockRepo::reap_all_expired(&pool).await {
                    Ok(reaped) if reaped > 0 => {
                        tracing::debug!(reaped, "Expiry sweep: cleared abandoned locks");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Expiry sweep: lock reaping failed");
                    }
                }
            }
        }
    }
}
