use crate::types::DbId;

/// Typed error taxonomy crossing the core boundary.
///
/// Every concurrency-control operation returns one of these as a
/// `Result` variant rather than leaking storage-engine errors, so
/// callers (HTTP handlers included) can map outcomes deterministically:
/// `OptimisticConflict` and `UniquenessViolation` to a 409-style
/// response, `NotFound` to 404, `LockAcquisitionFailed` to a retriable
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Target entity absent. Not retried.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Contention on a lock key could not be resolved within the retry
    /// budget. The caller's critical section never ran, so the
    /// higher-level operation aborted with zero side effects and may be
    /// retried as a whole later.
    #[error("Could not acquire lock '{key}' after {attempts} attempts")]
    LockAcquisitionFailed { key: String, attempts: u32 },

    /// The entity changed between the caller's read and write. Surfaced
    /// to the end user as "please refresh and retry"; never auto-retried,
    /// since blindly retrying could overwrite a valid concurrent change.
    #[error("{entity} {id} was modified by another request")]
    OptimisticConflict { entity: &'static str, id: DbId },

    /// A uniqueness-guarded field (privy id, wallet address) is already
    /// claimed. Returned as a clean domain error even when the storage
    /// constraint is what caught it.
    #[error("Duplicate value for unique field: {field}")]
    UniquenessViolation { field: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may safely retry the whole operation.
    ///
    /// Only lock-acquisition failures qualify: the critical section
    /// never ran, so no partial state exists to reconcile.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CoreError::LockAcquisitionFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_failure_is_retriable() {
        let err = CoreError::LockAcquisitionFailed {
            key: "user:42".into(),
            attempts: 10,
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn conflict_is_not_retriable() {
        let err = CoreError::OptimisticConflict {
            entity: "user",
            id: 42,
        };
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "user 42 was modified by another request");
    }
}
