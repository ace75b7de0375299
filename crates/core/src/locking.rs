//! Pure locking policy: tuning knobs, backoff schedule, key namespacing.
//!
//! The database-facing lock manager lives in `latch-db`; everything
//! here is deterministic and unit-testable without a pool.

use std::time::Duration;

/// Default lock lifetime. Long-running critical sections must renew
/// before this elapses or risk being reaped by another contender.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the initial acquisition attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default base delay between retries; attempt N waits N times this.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Tuning parameters for lock acquisition.
///
/// Defaults are sized so the total retry budget (sum of backoff delays,
/// ~16.5s) safely exceeds the expected hold time of contended
/// operations such as session reconciliation and versioned user
/// updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long an acquired lock lives before any contender may reap it.
    pub timeout: Duration,
    /// Retry attempts after the first failed insert.
    pub max_retries: u32,
    /// Base delay for the linear backoff schedule.
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl LockConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default |
    /// |-----------------------|---------|
    /// | `LOCK_TIMEOUT_MS`     | `30000` |
    /// | `LOCK_MAX_RETRIES`    | `10`    |
    /// | `LOCK_RETRY_DELAY_MS` | `300`   |
    pub fn from_env() -> Self {
        let timeout_ms: u64 = std::env::var("LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LOCK_TIMEOUT.as_millis() as u64);

        let max_retries: u32 = std::env::var("LOCK_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let retry_delay_ms: u64 = std::env::var("LOCK_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_DELAY.as_millis() as u64);

        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): linear backoff,
    /// `retry_delay * attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }

    /// Worst-case total wait across the whole retry budget. The
    /// acquisition loop is a bounded blocking wait, never a spin.
    pub fn max_total_wait(&self) -> Duration {
        // Sum of retry_delay * n for n in 1..=max_retries.
        let steps = u64::from(self.max_retries) * u64::from(self.max_retries + 1) / 2;
        self.retry_delay * (steps.min(u64::from(u32::MAX)) as u32)
    }
}

/// Lock key constructors.
///
/// Keys namespace the contended resource; all writers of a resource
/// must derive the key the same way or the lock serializes nothing.
pub mod keys {
    use crate::types::DbId;

    /// Lock covering mutations of one user row.
    pub fn user(id: DbId) -> String {
        format!("user:{id}")
    }

    /// Lock covering registration for an external identity, so two
    /// concurrent sign-ups with the same privy id collapse to one row.
    pub fn user_registration(privy_id: &str) -> String {
        format!("user:privy:{privy_id}")
    }

    /// Lock covering a candidate wallet address while its uniqueness is
    /// checked and claimed.
    pub fn wallet(address: &str) -> String {
        format!("wallet:{address}")
    }

    /// Lock serializing session reconciliation for one (user, device)
    /// pairing. This is the true deduplication mechanism for logins.
    pub fn session(user_id: DbId, device_id: &str) -> String {
        format!("session:{user_id}:{device_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_exceeds_default_timeout_hold() {
        let cfg = LockConfig::default();
        // 300ms * (1+2+...+10) = 16.5s of cumulative waiting.
        assert_eq!(cfg.max_total_wait(), Duration::from_millis(16_500));
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        // Runs in an environment without LOCK_* overrides.
        assert_eq!(LockConfig::from_env(), LockConfig::default());
    }

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let cfg = LockConfig::default();
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(300));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(600));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(900));
    }

    #[test]
    fn key_constructors_namespace_resources() {
        assert_eq!(keys::user(42), "user:42");
        assert_eq!(keys::wallet("0xabc"), "wallet:0xabc");
        assert_eq!(keys::session(42, "iphone-A"), "session:42:iphone-A");
        assert_eq!(keys::user_registration("did:privy:xyz"), "user:privy:did:privy:xyz");
    }
}
