//! Engine configuration.

use chrono::Duration;
use kurs_common::{constants, Currency, Freshness, RateSource};

/// Configuration for the rate resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Currency every stored record is quoted against.
    pub pivot: Currency,
    /// Oldest record age still classified as fresh.
    pub max_fresh_age: Duration,
    /// Cache TTL for values derived from fresh records.
    pub fresh_ttl: Duration,
    /// Cache TTL for values derived from stale records.
    pub stale_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pivot: Currency::uah(),
            max_fresh_age: constants::max_fresh_age(),
            fresh_ttl: constants::fresh_cache_ttl(),
            stale_ttl: constants::stale_cache_ttl(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a variable lookup such as `std::env::var`.
    ///
    /// Reads `KURS_PIVOT` and `KURS_MAX_FRESH_AGE_HOURS`. An unparsable age
    /// keeps the default; an invalid pivot is an error.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(pivot) = pivot_from_vars(&var)? {
            config.pivot = pivot;
        }

        if let Some(hours) = var("KURS_MAX_FRESH_AGE_HOURS") {
            if let Ok(hours) = hours.parse() {
                config.max_fresh_age = Duration::hours(hours);
            }
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_fresh_age <= Duration::zero() {
            return Err("Max fresh age must be positive".to_string());
        }

        if self.stale_ttl <= Duration::zero() {
            return Err("Stale TTL must be positive".to_string());
        }

        if self.stale_ttl > self.fresh_ttl {
            return Err("Stale TTL cannot exceed fresh TTL".to_string());
        }

        Ok(())
    }

    /// Cache TTL for a value of the given freshness.
    pub fn ttl_for(&self, freshness: Freshness) -> Duration {
        match freshness {
            Freshness::Fresh => self.fresh_ttl,
            Freshness::Stale => self.stale_ttl,
        }
    }
}

/// Configuration for the background refresh job.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Currency provider quotes are normalised against.
    pub pivot: Currency,
    /// Upper bound for a single provider fetch.
    pub fetch_timeout: Duration,
    /// Order in which sources are tried.
    pub priority: Vec<RateSource>,
    /// Capacity of the refresh request queue.
    pub queue_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pivot: Currency::uah(),
            fetch_timeout: constants::provider_fetch_timeout(),
            priority: RateSource::PRIORITY.to_vec(),
            queue_capacity: 256,
        }
    }
}

impl RefreshConfig {
    /// Load configuration from a variable lookup. Reads `KURS_PIVOT` and
    /// `KURS_FETCH_TIMEOUT_SECS`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(pivot) = pivot_from_vars(&var)? {
            config.pivot = pivot;
        }

        if let Some(secs) = var("KURS_FETCH_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.fetch_timeout = Duration::seconds(secs);
            }
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout <= Duration::zero() {
            return Err("Fetch timeout must be positive".to_string());
        }

        if self.priority.is_empty() {
            return Err("At least one rate source must be enabled".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("Refresh queue capacity cannot be 0".to_string());
        }

        Ok(())
    }
}

fn pivot_from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Option<Currency>, String> {
    var("KURS_PIVOT")
        .map(|code| Currency::parse(&code).map_err(|e| e.to_string()))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(ResolverConfig::default().validate().is_ok());
        assert!(RefreshConfig::default().validate().is_ok());
        assert_eq!(ResolverConfig::default().pivot, Currency::uah());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ResolverConfig::default();
        config.stale_ttl = Duration::hours(48);
        assert!(config.validate().is_err());

        let mut config = RefreshConfig::default();
        config.priority.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_for_freshness() {
        let config = ResolverConfig::default();
        assert_eq!(config.ttl_for(Freshness::Fresh), Duration::hours(24));
        assert_eq!(config.ttl_for(Freshness::Stale), Duration::hours(1));
    }

    #[test]
    fn test_default_priority_order() {
        assert_eq!(
            RefreshConfig::default().priority,
            vec![
                RateSource::CentralBank,
                RateSource::CommercialBank,
                RateSource::Aggregator
            ]
        );
    }

    #[test]
    fn test_from_vars() {
        let var = |key: &str| match key {
            "KURS_PIVOT" => Some("pln".to_string()),
            "KURS_MAX_FRESH_AGE_HOURS" => Some("12".to_string()),
            "KURS_FETCH_TIMEOUT_SECS" => Some("3".to_string()),
            _ => None,
        };

        let resolver = ResolverConfig::from_vars(var).unwrap();
        assert_eq!(resolver.pivot, Currency::pln());
        assert_eq!(resolver.max_fresh_age, Duration::hours(12));

        let refresh = RefreshConfig::from_vars(var).unwrap();
        assert_eq!(refresh.pivot, Currency::pln());
        assert_eq!(refresh.fetch_timeout, Duration::seconds(3));
    }

    #[test]
    fn test_from_vars_defaults_and_errors() {
        let config = ResolverConfig::from_vars(|key: &str| {
            (key == "KURS_MAX_FRESH_AGE_HOURS").then(|| "soon".to_string())
        })
        .unwrap();
        assert_eq!(config.max_fresh_age, Duration::hours(24));

        let bad_pivot = |key: &str| (key == "KURS_PIVOT").then(|| "hryvnia".to_string());
        assert!(ResolverConfig::from_vars(bad_pivot).is_err());
        assert!(RefreshConfig::from_vars(bad_pivot).is_err());
    }
}
