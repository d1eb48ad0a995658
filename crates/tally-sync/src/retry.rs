//! # Per-Record Retry Policy
//!
//! A failed submission is not retried inside the run. Instead the record gets
//! an attempt count and a next-eligible time, and runs skip it until then.
//!
//! ```text
//! attempt   delay (initial 2s, cap 300s)
//! ───────   ─────
//!    1        2s
//!    2        4s
//!    3        8s
//!   ...
//!    8      256s
//!    9+     300s
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::SyncSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 0 = unlimited.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        RetryPolicy {
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
            max_attempts: settings.max_attempts,
        }
    }

    /// Delay after the `attempts`-th consecutive failure (1-based).
    pub fn backoff(&self, attempts: i64) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 31) as u32;
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Earliest time the record may be submitted again.
    pub fn next_attempt_at(&self, attempts: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.backoff(attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(self.max_backoff.as_secs() as i64));
        now + delay
    }

    /// True if a record with this many failures is no longer submitted.
    pub fn is_exhausted(&self, attempts: i64) -> bool {
        self.max_attempts > 0 && attempts >= i64::from(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            max_attempts: 0,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(8), Duration::from_secs(256));
        assert_eq!(p.backoff(9), Duration::from_secs(300));
        assert_eq!(p.backoff(1_000), Duration::from_secs(300));
    }

    #[test]
    fn test_next_attempt_is_in_future() {
        let now = Utc::now();
        let at = policy().next_attempt_at(1, now);
        assert_eq!(at - now, chrono::Duration::seconds(2));
    }

    #[test]
    fn test_unlimited_attempts() {
        assert!(!policy().is_exhausted(10_000));

        let limited = RetryPolicy {
            max_attempts: 5,
            ..policy()
        };
        assert!(!limited.is_exhausted(4));
        assert!(limited.is_exhausted(5));
    }

    #[test]
    fn test_from_settings() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_backoff, Duration::from_millis(2_000));
        assert_eq!(p.max_backoff, Duration::from_secs(300));
    }
}
