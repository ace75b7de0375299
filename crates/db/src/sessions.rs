//! Session reconciliation state machine.
//!
//! A session row exists once per (user, device) pairing and cycles
//! between Active and Terminated on that same row. Reconciliation runs
//! under the `session:<user>:<device>` lock and a single transaction,
//! and enforces the single-active-session invariant by terminating
//! every other Active session of the user before committing.

use chrono::{Duration, Utc};
use latch_core::error::CoreError;
use latch_core::locking::keys;
use latch_core::types::DbId;
use sqlx::PgPool;

use crate::error::map_db_error;
use crate::locks::LockManager;
use crate::models::session::{termination_reasons, GetOrCreateSession, UserSession};
use crate::repositories::SessionRepo;

/// Default session lifetime when the caller does not supply one.
pub const DEFAULT_EXPIRES_DAYS: i64 = 30;

/// Owns every `is_active` / `terminated_at` / `termination_reason`
/// transition; no other component writes these fields.
#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    locks: LockManager,
}

impl SessionService {
    pub fn new(pool: PgPool, locks: LockManager) -> Self {
        Self { pool, locks }
    }

    /// Reconcile a login from a device, idempotently.
    ///
    /// Under the (user, device) lock, in one transaction:
    /// - no row for the pairing: insert a fresh Active row;
    /// - existing row, any state: reactivate it in place, merging
    ///   supplied device metadata and refreshing expiry;
    /// - either way, terminate every other Active session of the user
    ///   with reason `new_session_on_different_device` before commit.
    ///
    /// Repeated calls from the same device return the same row (same
    /// `id`, same `created_at`) forever. The only failure mode is
    /// [`CoreError::LockAcquisitionFailed`]; there is no duplicate
    /// error to return. The idempotency key is recorded for
    /// diagnostics only; the lock is what deduplicates.
    pub async fn get_or_create(&self, input: &GetOrCreateSession) -> Result<UserSession, CoreError> {
        let key = keys::session(input.user_id, &input.device_id);
        self.locks
            .with_lock(&key, || async {
                let expires_at = Utc::now()
                    + Duration::days(input.expires_in_days.unwrap_or(DEFAULT_EXPIRES_DAYS));

                let mut tx = self.pool.begin().await.map_err(map_db_error)?;

                let existing = SessionRepo::find_by_user_device_in_tx(
                    &mut tx,
                    input.user_id,
                    &input.device_id,
                )
                .await
                .map_err(map_db_error)?;

                let (session, reactivated) = match existing {
                    Some(row) => {
                        let session = SessionRepo::reactivate_in_tx(
                            &mut tx,
                            row.id,
                            &input.metadata,
                            expires_at,
                            input.idempotency_key.as_deref(),
                        )
                        .await
                        .map_err(map_db_error)?;
                        (session, true)
                    }
                    None => {
                        let session = SessionRepo::create_in_tx(
                            &mut tx,
                            input.user_id,
                            &input.device_id,
                            &input.metadata,
                            expires_at,
                            input.idempotency_key.as_deref(),
                        )
                        .await
                        .map_err(map_db_error)?;
                        (session, false)
                    }
                };

                let superseded = SessionRepo::terminate_others_in_tx(
                    &mut tx,
                    input.user_id,
                    session.id,
                    termination_reasons::NEW_SESSION_ON_DIFFERENT_DEVICE,
                )
                .await
                .map_err(map_db_error)?;

                tx.commit().await.map_err(map_db_error)?;

                tracing::info!(
                    user_id = input.user_id,
                    device_id = %input.device_id,
                    session_id = session.id,
                    reactivated,
                    superseded,
                    "Session reconciled"
                );
                Ok(session)
            })
            .await
    }

    /// Terminate one session by primary key (logout, admin action).
    ///
    /// Operates on an already-identified row, so no reconciliation
    /// lock is taken. Returns `true` if the row was Active.
    pub async fn terminate(&self, id: DbId, reason: &str) -> Result<bool, CoreError> {
        let terminated = SessionRepo::terminate(&self.pool, id, reason)
            .await
            .map_err(map_db_error)?;
        if terminated {
            tracing::info!(session_id = id, reason, "Session terminated");
        }
        Ok(terminated)
    }

    /// Terminate every Active session of a user. Returns the count.
    ///
    /// May race a concurrent `get_or_create`, which is acceptable:
    /// both paths converge on "at most one active session" as the
    /// stable end-state.
    pub async fn terminate_all_for_user(
        &self,
        user_id: DbId,
        reason: &str,
    ) -> Result<u64, CoreError> {
        let count = SessionRepo::terminate_all_for_user(&self.pool, user_id, reason)
            .await
            .map_err(map_db_error)?;
        tracing::info!(user_id, reason, count, "Terminated all user sessions");
        Ok(count)
    }

    /// Mark every overdue Active session Terminated with reason
    /// `expired`. Driven periodically by the background sweep; rows
    /// are never deleted.
    pub async fn sweep_expired(&self) -> Result<u64, CoreError> {
        SessionRepo::terminate_expired(&self.pool, termination_reasons::EXPIRED)
            .await
            .map_err(map_db_error)
    }

    /// Bump `last_activity_at` on an Active session.
    pub async fn touch(&self, id: DbId) -> Result<bool, CoreError> {
        SessionRepo::touch(&self.pool, id).await.map_err(map_db_error)
    }
}
