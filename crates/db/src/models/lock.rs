//! Distributed lock model.

use latch_core::types::{LockOwner, Timestamp};
use sqlx::FromRow;

/// A row from the `distributed_locks` table.
///
/// Transient: created at acquisition, deleted at release or reaped by
/// any contender once `expires_at` has passed. At most one live row
/// exists per `lock_key` at any instant.
#[derive(Debug, Clone, FromRow)]
pub struct LockRecord {
    /// Semantic namespace of the contended resource, e.g. `user:42`,
    /// `wallet:0xabc`, `session:42:iphone-A`.
    pub lock_key: String,
    /// Token identifying the holder of this acquisition.
    pub lock_owner: LockOwner,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
}
