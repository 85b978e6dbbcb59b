//! Rate resolution: cache, then store, then triangulation.
//!
//! The resolver never calls a provider. When nothing resolves, or when it has
//! to serve stale data, it may enqueue a refresh for the background worker.

use std::sync::Arc;

use async_trait::async_trait;
use kurs_common::{Currency, CurrencyPair, DurationExt, Freshness};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::cache::{CachedRate, RateCache, SharedRateCache};
use crate::config::ResolverConfig;
use crate::error::{FxError, FxResult};
use crate::refresh::RefreshRequester;
use crate::store::{RateStore, SharedRateStore};
use crate::triangulation::{PivotLegs, Triangulator};

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Base and target are the same currency.
    Identity,
    Cache,
    Store,
    Triangulated,
}

/// A rate together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Units of the target per one unit of the base.
    pub rate: Decimal,
    /// Cache hits keep the freshness of the data they were derived from.
    pub freshness: Freshness,
    pub origin: Origin,
}

/// Single entry point answering "how many `target` per one `base`".
pub struct Resolver {
    cache: SharedRateCache,
    store: SharedRateStore,
    triangulator: Triangulator,
    refresh: Option<RefreshRequester>,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver over the given cache and store.
    pub fn new(
        cache: Arc<dyn RateCache>,
        store: Arc<dyn RateStore>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            store,
            triangulator: Triangulator::new(config.pivot.clone()),
            refresh: None,
            config,
        }
    }

    /// Enqueue background refreshes for misses and stale hits.
    pub fn with_refresh_requests(mut self, requester: RefreshRequester) -> Self {
        self.refresh = Some(requester);
        self
    }

    pub fn pivot(&self) -> &Currency {
        &self.config.pivot
    }

    /// Get the rate from `base` to `target`.
    ///
    /// `force_refresh` skips the cache read; the store is still the source.
    /// The only error is [`FxError::RateNotAvailable`].
    #[instrument(skip_all, fields(base = %base, target = %target, force_refresh = force_refresh))]
    pub async fn get_rate(
        &self,
        base: &Currency,
        target: &Currency,
        force_refresh: bool,
    ) -> FxResult<Decimal> {
        let pair = CurrencyPair::new(base.clone(), target.clone());
        self.resolve(&pair, force_refresh)
            .await
            .map(|resolved| resolved.rate)
    }

    /// Resolve a pair, reporting freshness and origin.
    pub async fn resolve(&self, pair: &CurrencyPair, force_refresh: bool) -> FxResult<Resolved> {
        if let Some(resolved) = self.resolve_direct(pair, force_refresh).await {
            return Ok(resolved);
        }

        if pair.involves(self.pivot()) {
            self.request_refresh(pair);
        } else if let Ok(resolved) = self
            .triangulator
            .triangulate(self, &pair.base, &pair.quote)
            .await
        {
            self.cache.set(
                pair,
                CachedRate::new(resolved.rate, resolved.freshness),
                self.config.ttl_for(resolved.freshness),
            );
            return Ok(resolved);
        }

        warn!(pair = %pair, "No rate available");
        Err(FxError::RateNotAvailable(pair.clone()))
    }

    /// Convert `amount` of `from` into `to`.
    #[instrument(skip_all, fields(from = %from, to = %to, amount = %amount))]
    pub async fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(amount);
        }

        let rate = self.get_rate(from, to, false).await?;
        amount
            .checked_mul(rate)
            .ok_or_else(|| FxError::Overflow(CurrencyPair::new(from.clone(), to.clone())))
    }

    /// Identity, cache and store lookups. Never triangulates.
    async fn resolve_direct(&self, pair: &CurrencyPair, force_refresh: bool) -> Option<Resolved> {
        if pair.is_identity() {
            return Some(Resolved {
                rate: Decimal::ONE,
                freshness: Freshness::Fresh,
                origin: Origin::Identity,
            });
        }

        if !force_refresh {
            if let Some(cached) = self.cache.get(pair) {
                return Some(Resolved {
                    rate: cached.rate,
                    freshness: cached.freshness,
                    origin: Origin::Cache,
                });
            }
        }

        if let Some(resolved) = self.from_store(pair, pair).await {
            return Some(resolved);
        }

        // Pivot pairs may be stored under the opposite direction.
        if pair.involves(self.pivot()) {
            return self.from_store(&pair.inverse(), pair).await;
        }

        None
    }

    /// Read the latest record stored under `stored` and orient it to `requested`.
    async fn from_store(&self, stored: &CurrencyPair, requested: &CurrencyPair) -> Option<Resolved> {
        let record = match self.store.latest(stored).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(pair = %stored, error = %e, "Rate store lookup failed");
                return None;
            }
        };

        let Some(rate) = record.rate_for(requested) else {
            warn!(
                id = %record.id,
                stored = %stored,
                requested = %requested,
                convention = %record.convention,
                "Stored record cannot be oriented to requested pair"
            );
            return None;
        };

        let freshness = record.freshness(self.config.max_fresh_age);
        if freshness.is_stale() {
            warn!(
                pair = %requested,
                source = %record.source,
                age_hours = record.age().whole_hours(),
                "Serving stale rate"
            );
            self.request_refresh(requested);
        }

        self.cache.set(
            requested,
            CachedRate::new(rate, freshness),
            self.config.ttl_for(freshness),
        );

        debug!(
            pair = %requested,
            source = %record.source,
            rate = %rate,
            freshness = ?freshness,
            "Resolved from store"
        );

        Some(Resolved {
            rate,
            freshness,
            origin: Origin::Store,
        })
    }

    fn request_refresh(&self, pair: &CurrencyPair) {
        if let Some(requester) = &self.refresh {
            requester.request(pair.clone());
        }
    }
}

#[async_trait]
impl PivotLegs for Resolver {
    async fn leg_to_pivot(&self, currency: &Currency) -> FxResult<Resolved> {
        let pair = CurrencyPair::new(currency.clone(), self.pivot().clone());
        match self.resolve_direct(&pair, false).await {
            Some(resolved) => Ok(resolved),
            None => {
                self.request_refresh(&pair);
                Err(FxError::RateNotAvailable(pair))
            }
        }
    }
}
