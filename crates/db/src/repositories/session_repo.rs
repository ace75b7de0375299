//! Repository for the `user_sessions` table.
//!
//! Reads and by-primary-key terminations are public. The reconciliation
//! writes (`create_in_tx`, `reactivate_in_tx`, `terminate_others_in_tx`)
//! are crate-private: `is_active`, `terminated_at`, and
//! `termination_reason` transitions are owned exclusively by
//! [`crate::sessions::SessionService`].

use latch_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::session::{DeviceMetadata, UserSession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, device_id, is_active, expires_at, terminated_at, \
    termination_reason, idempotency_key, device_name, device_model, os_version, \
    app_version, push_token, last_activity_at, created_at, updated_at";

/// Provides row operations for user sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Find a session by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE id = $1");
        sqlx::query_as::<_, UserSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the session row for a (user, device) pairing, in any state.
    pub async fn find_by_user_device(
        pool: &PgPool,
        user_id: DbId,
        device_id: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM user_sessions WHERE user_id = $1 AND device_id = $2");
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .bind(device_id)
            .fetch_optional(pool)
            .await
    }

    /// List all sessions for a user, most recently active first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1
             ORDER BY last_activity_at DESC"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Bump `last_activity_at` on an Active session. Returns `true` if
    /// the row was updated.
    pub async fn touch(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET last_activity_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition one session Active → Terminated by primary key.
    /// Already-terminated rows are left untouched. Returns `true` if
    /// the row was updated.
    pub(crate) async fn terminate(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, terminated_at = NOW(),
                 termination_reason = $2, updated_at = NOW()
             WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition every Active session of a user to Terminated.
    /// Returns the count of terminated sessions.
    pub(crate) async fn terminate_all_for_user(
        pool: &PgPool,
        user_id: DbId,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, terminated_at = NOW(),
                 termination_reason = $2, updated_at = NOW()
             WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Transition every Active session whose expiry has passed to
    /// Terminated with reason `expired`. Rows are never deleted.
    pub(crate) async fn terminate_expired(
        pool: &PgPool,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, terminated_at = NOW(),
                 termination_reason = $1, updated_at = NOW()
             WHERE is_active = true AND expires_at <= NOW()",
        )
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ── Reconciliation writes (run inside the service's transaction) ──

    /// Read the (user, device) row with a row lock, inside the
    /// reconciliation transaction.
    pub(crate) async fn find_by_user_device_in_tx(
        conn: &mut PgConnection,
        user_id: DbId,
        device_id: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1 AND device_id = $2
             FOR UPDATE"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .bind(device_id)
            .fetch_optional(conn)
            .await
    }

    /// Insert a fresh Active row for a never-seen (user, device) pair.
    pub(crate) async fn create_in_tx(
        conn: &mut PgConnection,
        user_id: DbId,
        device_id: &str,
        metadata: &DeviceMetadata,
        expires_at: Timestamp,
        idempotency_key: Option<&str>,
    ) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions
                (user_id, device_id, expires_at, idempotency_key,
                 device_name, device_model, os_version, app_version, push_token)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .bind(device_id)
            .bind(expires_at)
            .bind(idempotency_key)
            .bind(&metadata.device_name)
            .bind(&metadata.device_model)
            .bind(&metadata.os_version)
            .bind(&metadata.app_version)
            .bind(&metadata.push_token)
            .fetch_one(conn)
            .await
    }

    /// Reactivate an existing row, whatever state it is in: set Active,
    /// clear the termination fields, refresh expiry and activity, and
    /// merge supplied device metadata without discarding unspecified
    /// fields.
    pub(crate) async fn reactivate_in_tx(
        conn: &mut PgConnection,
        id: DbId,
        metadata: &DeviceMetadata,
        expires_at: Timestamp,
        idempotency_key: Option<&str>,
    ) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions SET
                is_active = true,
                terminated_at = NULL,
                termination_reason = NULL,
                expires_at = $2,
                idempotency_key = COALESCE($3, idempotency_key),
                device_name = COALESCE($4, device_name),
                device_model = COALESCE($5, device_model),
                os_version = COALESCE($6, os_version),
                app_version = COALESCE($7, app_version),
                push_token = COALESCE($8, push_token),
                last_activity_at = NOW(),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(id)
            .bind(expires_at)
            .bind(idempotency_key)
            .bind(&metadata.device_name)
            .bind(&metadata.device_model)
            .bind(&metadata.os_version)
            .bind(&metadata.app_version)
            .bind(&metadata.push_token)
            .fetch_one(conn)
            .await
    }

    /// Terminate every *other* Active session of the user, any device.
    /// Returns the count of superseded sessions.
    pub(crate) async fn terminate_others_in_tx(
        conn: &mut PgConnection,
        user_id: DbId,
        keep_id: DbId,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, terminated_at = NOW(),
                 termination_reason = $3, updated_at = NOW()
             WHERE user_id = $1 AND id <> $2 AND is_active = true",
        )
        .bind(user_id)
        .bind(keep_id)
        .bind(reason)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
