//! User model and DTOs.
//!
//! The user row is the system's versioned entity: `version` increments
//! by exactly 1 on every successful mutation and is never reset, so a
//! caller presenting a stale version can never clobber a concurrent
//! write.

use latch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A user row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    /// External identity provider id, unique across users.
    pub privy_id: String,
    /// Linked wallet address, unique when present.
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Optimistic-concurrency counter.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub privy_id: String,
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// DTO for patching a user. Only non-`None` fields are applied.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}
