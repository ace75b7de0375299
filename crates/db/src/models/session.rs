//! User session model and DTOs.
//!
//! One row exists per (user, device) pairing for the life of that
//! pairing: logging out and back in toggles `is_active` and
//! `terminated_at` on the same row rather than inserting a new one.
//! `created_at` records the first ever login from the device;
//! `last_activity_at` and `terminated_at` record the most recent
//! transitions.

use latch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Termination reason tags recorded on Active → Terminated transitions.
pub mod termination_reasons {
    pub const LOGOUT: &str = "logout";
    pub const EXPIRED: &str = "expired";
    pub const NEW_SESSION_ON_DIFFERENT_DEVICE: &str = "new_session_on_different_device";
    pub const ADMIN_REVOKED: &str = "admin_revoked";
}

/// A session row from the `user_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    pub device_id: String,
    pub is_active: bool,
    pub expires_at: Timestamp,
    pub terminated_at: Option<Timestamp>,
    pub termination_reason: Option<String>,
    /// Client-supplied key recorded for diagnostics only; the
    /// (user, device) lock is the true deduplication mechanism.
    pub idempotency_key: Option<String>,
    pub device_name: Option<String>,
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub push_token: Option<String>,
    pub last_activity_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Device metadata supplied at login. `None` fields never overwrite
/// values already stored on the row.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    pub device_name: Option<String>,
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub push_token: Option<String>,
}

/// Input to session reconciliation.
#[derive(Debug, Clone)]
pub struct GetOrCreateSession {
    pub user_id: DbId,
    pub device_id: String,
    pub metadata: DeviceMetadata,
    /// Session lifetime in days; defaults to 30 when `None`.
    pub expires_in_days: Option<i64>,
    pub idempotency_key: Option<String>,
}
