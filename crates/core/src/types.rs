/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque token identifying which acquisition currently holds a lock.
///
/// A fresh token is minted per acquisition, so a holder can never
/// release or renew a lock that expired and was re-acquired elsewhere.
pub type LockOwner = uuid::Uuid;
