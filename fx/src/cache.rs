//! Rate caching with TTL support.
//!
//! The cache is an optimisation in front of the store. Implementations must
//! never fail: an unavailable backend reads as a miss and drops writes.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use kurs_common::{Currency, CurrencyPair, Freshness};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// A cached rate and the freshness of the data it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedRate {
    pub rate: Decimal,
    pub freshness: Freshness,
}

impl CachedRate {
    pub fn new(rate: Decimal, freshness: Freshness) -> Self {
        Self { rate, freshness }
    }

    pub fn fresh(rate: Decimal) -> Self {
        Self::new(rate, Freshness::Fresh)
    }
}

/// Non-authoritative key/value cache of resolved rates.
pub trait RateCache: Send + Sync {
    /// Look up a rate. Expired or unavailable entries are a miss.
    fn get(&self, pair: &CurrencyPair) -> Option<CachedRate>;

    /// Insert or overwrite a rate for `ttl`.
    fn set(&self, pair: &CurrencyPair, rate: CachedRate, ttl: Duration);

    /// Drop the entry for `pair`, if any.
    fn invalidate(&self, pair: &CurrencyPair);

    /// Drop every entry with `currency` on either side, derived cross rates
    /// included. Returns the number of entries removed.
    fn invalidate_involving(&self, currency: &Currency) -> usize;
}

/// Cached rate entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    rate: CachedRate,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn new(rate: CachedRate, ttl: Duration) -> Self {
        Self {
            rate,
            cached_at: Utc::now(),
            ttl,
        }
    }

    fn is_valid(&self) -> bool {
        Utc::now().signed_duration_since(self.cached_at) < self.ttl
    }
}

/// Configuration for the in-process cache.
#[derive(Debug, Clone)]
pub struct MemoryRateCacheConfig {
    /// Entry count above which expired entries are swept before inserting.
    pub max_entries: usize,
}

impl Default for MemoryRateCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10000 }
    }
}

/// Thread-safe in-process rate cache. Operations lock a single shard.
pub struct MemoryRateCache {
    cache: DashMap<CurrencyPair, CacheEntry>,
    config: MemoryRateCacheConfig,
}

impl MemoryRateCache {
    /// Create a new rate cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryRateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(config: MemoryRateCacheConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
        }
    }

    /// TTL the live entry for `pair` was stored with.
    pub fn ttl(&self, pair: &CurrencyPair) -> Option<Duration> {
        self.cache
            .get(pair)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.ttl)
    }

    /// Clear all cached rates.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        self.cache.retain(|_, entry| entry.is_valid());
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.cache.len();
        let valid = self.cache.iter().filter(|e| e.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

impl RateCache for MemoryRateCache {
    fn get(&self, pair: &CurrencyPair) -> Option<CachedRate> {
        if let Some(entry) = self.cache.get(pair) {
            if entry.is_valid() {
                debug!(pair = %pair, "Cache hit");
                return Some(entry.rate);
            }
            debug!(pair = %pair, "Cache entry expired");
            // Release the shard guard before removing.
            drop(entry);
            // A concurrent set may have replaced the entry meanwhile.
            self.cache.remove_if(pair, |_, entry| !entry.is_valid());
        }

        debug!(pair = %pair, "Cache miss");
        None
    }

    fn set(&self, pair: &CurrencyPair, rate: CachedRate, ttl: Duration) {
        if self.cache.len() >= self.config.max_entries {
            self.evict_expired();
        }

        self.cache.insert(pair.clone(), CacheEntry::new(rate, ttl));
    }

    fn invalidate(&self, pair: &CurrencyPair) {
        if self.cache.remove(pair).is_some() {
            debug!(pair = %pair, "Cache entry invalidated");
        }
    }

    fn invalidate_involving(&self, currency: &Currency) -> usize {
        let before = self.cache.len();
        self.cache.retain(|pair, _| !pair.involves(currency));
        let removed = before.saturating_sub(self.cache.len());

        debug!(currency = %currency, removed, "Cache entries invalidated");
        removed
    }
}

impl Default for MemoryRateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// Shared rate cache.
pub type SharedRateCache = Arc<dyn RateCache>;
