//! Time-bound feature lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Expiry attached to a feature definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    expires_at: DateTime<Utc>,
}

impl ExpirationPolicy {
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self { expires_at }
    }

    /// Expire after the given duration from now
    pub fn after(duration: Duration) -> Self {
        Self::new(Utc::now() + duration)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether `now` is past the expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the expiry falls within `[now, now + days]`.
    ///
    /// A window past the representable range reaches the end of time.
    pub fn is_expiring_soon_at(&self, now: DateTime<Utc>, days: i64) -> bool {
        if days < 0 || self.expires_at < now {
            return false;
        }
        match Duration::try_days(days).and_then(|window| now.checked_add_signed(window)) {
            Some(end) => self.expires_at <= end,
            None => true,
        }
    }

    pub fn is_expiring_soon(&self, days: i64) -> bool {
        self.is_expiring_soon_at(Utc::now(), days)
    }

    /// Time left before expiry, if any
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at > now).then(|| self.expires_at - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired() {
        let now = Utc::now();
        let policy = ExpirationPolicy::new(now - Duration::seconds(1));
        assert!(policy.is_expired_at(now));
        assert!(!policy.is_expiring_soon_at(now, 7));
        assert!(policy.remaining_at(now).is_none());
    }

    #[test]
    fn test_not_expired() {
        let now = Utc::now();
        let policy = ExpirationPolicy::new(now + Duration::hours(1));
        assert!(!policy.is_expired_at(now));
        assert_eq!(policy.remaining_at(now), Some(Duration::hours(1)));
    }

    #[test]
    fn test_expiring_soon_window() {
        let now = Utc::now();
        let policy = ExpirationPolicy::new(now + Duration::days(3));
        assert!(policy.is_expiring_soon_at(now, 3));
        assert!(policy.is_expiring_soon_at(now, 7));
        assert!(!policy.is_expiring_soon_at(now, 2));
    }

    #[test]
    fn test_boundary_is_not_expired() {
        let now = Utc::now();
        let policy = ExpirationPolicy::new(now);
        assert!(!policy.is_expired_at(now));
        assert!(policy.is_expiring_soon_at(now, 0));
    }

    #[test]
    fn test_huge_window_reaches_end_of_time() {
        let now = Utc::now();
        let policy = ExpirationPolicy::new(now + Duration::days(365 * 100));
        assert!(policy.is_expiring_soon_at(now, i64::MAX));
        assert!(!policy.is_expiring_soon_at(now, i64::MIN));
        assert!(!policy.is_expiring_soon_at(now, -1));
    }
}
