//! User mutation service: the versioned entity protocol applied to the
//! `users` table.
//!
//! Every mutation runs inside a `user:<id>` lock for defense in depth;
//! the version check alone already prevents lost updates for callers
//! that read before writing, while the lock serializes simultaneous
//! writers so the loser observes the winner's committed version
//! deterministically. Uniqueness-guarded fields (privy id at
//! registration, wallet address on link) are checked inside a second
//! lock scoped to the candidate value, with the `uq_` constraints as
//! the storage-level second line of defense.

use latch_core::error::CoreError;
use latch_core::locking::keys;
use latch_core::types::DbId;
use sqlx::PgPool;

use crate::error::map_db_error;
use crate::locks::LockManager;
use crate::models::user::{CreateUser, UpdateUser, User};
use crate::repositories::user_repo::VersionedUpdate;
use crate::repositories::UserRepo;

/// Lock-guarded create/update operations for users.
#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    locks: LockManager,
}

impl UserService {
    pub fn new(pool: PgPool, locks: LockManager) -> Self {
        Self { pool, locks }
    }

    /// Create a user exactly once for an external identity.
    ///
    /// Duplicate concurrent registrations for the same privy id are
    /// serialized by the registration lock: the first inserts, every
    /// other sees the existing row and gets
    /// [`CoreError::UniquenessViolation`].
    pub async fn register(&self, input: &CreateUser) -> Result<User, CoreError> {
        let key = keys::user_registration(&input.privy_id);
        self.locks
            .with_lock(&key, || async {
                let existing = UserRepo::find_by_privy_id(&self.pool, &input.privy_id)
                    .await
                    .map_err(map_db_error)?;
                if existing.is_some() {
                    return Err(CoreError::UniquenessViolation {
                        field: "privy_id".to_string(),
                    });
                }

                let user = match &input.wallet_address {
                    Some(address) => {
                        let wallet_key = keys::wallet(address);
                        self.locks
                            .with_lock(&wallet_key, || async {
                                self.check_wallet_free(address, None).await?;
                                UserRepo::create(&self.pool, input).await.map_err(map_db_error)
                            })
                            .await?
                    }
                    None => UserRepo::create(&self.pool, input).await.map_err(map_db_error)?,
                };

                tracing::info!(user_id = user.id, "User registered");
                Ok(user)
            })
            .await
    }

    /// Fetch a user or fail with [`CoreError::NotFound`].
    pub async fn get(&self, id: DbId) -> Result<User, CoreError> {
        UserRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .ok_or(CoreError::NotFound { entity: "user", id })
    }

    /// Apply a patch under the optimistic-concurrency protocol.
    ///
    /// A stale `expected_version` fails with
    /// [`CoreError::OptimisticConflict`] and leaves the row untouched;
    /// `None` skips the check (last-write-wins for callers that opted
    /// out, still serialized by the lock and still version-bumped).
    pub async fn update_with_version(
        &self,
        id: DbId,
        patch: &UpdateUser,
        expected_version: Option<i64>,
    ) -> Result<User, CoreError> {
        let key = keys::user(id);
        self.locks
            .with_lock(&key, || async {
                match &patch.wallet_address {
                    Some(address) => {
                        let wallet_key = keys::wallet(address);
                        self.locks
                            .with_lock(&wallet_key, || async {
                                self.check_wallet_free(address, Some(id)).await?;
                                self.apply_versioned(id, patch, expected_version).await
                            })
                            .await
                    }
                    None => self.apply_versioned(id, patch, expected_version).await,
                }
            })
            .await
    }

    /// Fail with [`CoreError::UniquenessViolation`] if the wallet is
    /// claimed by any user other than `claimant`. Must be called with
    /// the `wallet:<address>` lock held.
    async fn check_wallet_free(
        &self,
        address: &str,
        claimant: Option<DbId>,
    ) -> Result<(), CoreError> {
        let holder = UserRepo::find_by_wallet_address(&self.pool, address)
            .await
            .map_err(map_db_error)?;
        match holder {
            Some(user) if Some(user.id) != claimant => Err(CoreError::UniquenessViolation {
                field: "wallet_address".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn apply_versioned(
        &self,
        id: DbId,
        patch: &UpdateUser,
        expected_version: Option<i64>,
    ) -> Result<User, CoreError> {
        match UserRepo::update_with_version(&self.pool, id, patch, expected_version)
            .await
            .map_err(map_db_error)?
        {
            VersionedUpdate::Updated(user) => {
                tracing::debug!(user_id = id, version = user.version, "User updated");
                Ok(user)
            }
            VersionedUpdate::NotFound => Err(CoreError::NotFound { entity: "user", id }),
            VersionedUpdate::Conflict { actual } => {
                tracing::debug!(
                    user_id = id,
                    expected = ?expected_version,
                    actual,
                    "Versioned update rejected"
                );
                Err(CoreError::OptimisticConflict { entity: "user", id })
            }
        }
    }
}
