//! Time utilities and freshness constants.

use chrono::{DateTime, Duration, Utc};

/// Rate timing constants.
pub mod constants {
    use super::Duration;

    /// Maximum age of a stored rate that still counts as fresh (24 hours).
    pub fn max_fresh_age() -> Duration {
        Duration::hours(24)
    }

    /// Cache TTL for rates resolved from fresh data (24 hours).
    pub fn fresh_cache_ttl() -> Duration {
        Duration::hours(24)
    }

    /// Cache TTL for rates resolved from stale data (1 hour).
    pub fn stale_cache_ttl() -> Duration {
        Duration::hours(1)
    }

    /// Upper bound on a single provider fetch (10 seconds).
    pub fn provider_fetch_timeout() -> Duration {
        Duration::seconds(10)
    }

    /// Tolerated clock skew between provider timestamps and local time.
    pub fn max_clock_skew() -> Duration {
        Duration::seconds(5)
    }
}

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Age of `timestamp` relative to now. Never negative.
pub fn age_of(timestamp: Timestamp) -> Duration {
    let age = now() - timestamp;
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;

    /// Whole hours, for log fields.
    fn whole_hours(&self) -> i64;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }

    fn whole_hours(&self) -> i64 {
        self.num_hours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_of() {
        let earlier = now() - Duration::hours(3);
        let age = age_of(earlier);
        assert!(age >= Duration::hours(3));
        assert!(age < Duration::hours(3) + Duration::seconds(5));

        let future = now() + Duration::minutes(1);
        assert_eq!(age_of(future), Duration::zero());
    }

    #[test]
    fn test_stale_ttl_is_shorter() {
        assert!(constants::stale_cache_ttl() < constants::fresh_cache_ttl());
        assert_eq!(constants::max_fresh_age(), Duration::hours(24));
    }

    #[test]
    fn test_as_std() {
        assert_eq!(Duration::seconds(10).as_std(), std::time::Duration::from_secs(10));
        assert_eq!(Duration::seconds(-1).as_std(), std::time::Duration::ZERO);
    }
}
