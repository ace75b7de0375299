//! Conversion of storage-engine errors into the domain taxonomy.

use latch_core::error::CoreError;

/// Classify a sqlx error into a [`CoreError`].
///
/// PostgreSQL unique constraint violations (error code 23505) on a
/// `uq_`-prefixed constraint become [`CoreError::UniquenessViolation`]
/// with the offending field name; everything else is an internal error
/// with a sanitized message.
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                return CoreError::UniquenessViolation {
                    field: constraint_field(constraint).to_string(),
                };
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal(err.to_string())
}

/// Map a constraint name to the user-facing field it guards.
fn constraint_field(constraint: &str) -> &str {
    match constraint {
        "uq_users_privy_id" => "privy_id",
        "uq_users_wallet_address" => "wallet_address",
        "uq_user_sessions_user_device" => "device_id",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_map_to_field_names() {
        assert_eq!(constraint_field("uq_users_privy_id"), "privy_id");
        assert_eq!(constraint_field("uq_users_wallet_address"), "wallet_address");
        assert_eq!(constraint_field("uq_unknown_thing"), "uq_unknown_thing");
    }
}
