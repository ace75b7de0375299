//! Repository for the `users` table.

use latch_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{CreateUser, UpdateUser, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, privy_id, wallet_address, email, display_name, version, created_at, updated_at";

/// Outcome of a version-checked update, before domain-error mapping.
#[derive(Debug)]
pub enum VersionedUpdate {
    Updated(User),
    /// No row with the given id exists.
    NotFound,
    /// The stored version differed from the caller's expected version;
    /// no write occurred.
    Conflict { actual: i64 },
}

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user at version 0, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (privy_id, wallet_address, email, display_name)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.privy_id)
            .bind(&input.wallet_address)
            .bind(&input.email)
            .bind(&input.display_name)
            .fetch_one(pool)
            .await
    }

    /// Find a user by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by external identity id.
    pub async fn find_by_privy_id(
        pool: &PgPool,
        privy_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE privy_id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(privy_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by linked wallet address.
    pub async fn find_by_wallet_address(
        pool: &PgPool,
        wallet_address: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE wallet_address = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(wallet_address)
            .fetch_optional(pool)
            .await
    }

    /// List all users ordered by most recently created first.
    pub async fn list(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users ORDER BY created_at DESC");
        sqlx::query_as::<_, User>(&query).fetch_all(pool).await
    }

    /// Apply a patch under the optimistic-concurrency protocol.
    ///
    /// In one transaction: read the current row with a row lock, fail
    /// on absence or on a stale `expected_version`, else apply the
    /// non-`None` patch fields, bump `version` by 1, and refresh
    /// `updated_at`. When `expected_version` is `None` the version
    /// check is skipped but the bump still happens.
    pub async fn update_with_version(
        pool: &PgPool,
        id: DbId,
        input: &UpdateUser,
        expected_version: Option<i64>,
    ) -> Result<VersionedUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let stored: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((stored_version,)) = stored else {
            return Ok(VersionedUpdate::NotFound);
        };

        if let Some(expected) = expected_version {
            if expected != stored_version {
                // Roll back by dropping the transaction; no write occurred.
                return Ok(VersionedUpdate::Conflict {
                    actual: stored_version,
                });
            }
        }

        let update_query = format!(
            "UPDATE users SET
                wallet_address = COALESCE($2, wallet_address),
                email = COALESCE($3, email),
                display_name = COALESCE($4, display_name),
                version = version + 1,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&update_query)
            .bind(id)
            .bind(&input.wallet_address)
            .bind(&input.email)
            .bind(&input.display_name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(VersionedUpdate::Updated(user))
    }
}
