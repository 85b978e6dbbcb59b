//! Background refresh of pivot rates from external providers.
//!
//! The resolver only ever enqueues pairs through a [`RefreshRequester`]; the
//! network work happens in [`RefreshJob::run_worker`] or in scheduled
//! [`RefreshJob::refresh_all`] passes.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use kurs_common::{Currency, CurrencyPair, RateSource};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{RateCache, SharedRateCache};
use crate::config::RefreshConfig;
use crate::provider::{self, RateProvider};
use crate::store::{RateStore, SharedRateStore};

/// Sending half of the refresh queue. Cheap to clone.
#[derive(Clone)]
pub struct RefreshRequester {
    tx: mpsc::Sender<CurrencyPair>,
    pending: Arc<DashSet<CurrencyPair>>,
}

impl RefreshRequester {
    /// Create a bounded refresh queue.
    pub fn channel(capacity: usize) -> (Self, RefreshQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let pending = Arc::new(DashSet::new());
        (
            Self {
                tx,
                pending: pending.clone(),
            },
            RefreshQueue { rx, pending },
        )
    }

    /// Enqueue a pair without waiting.
    ///
    /// Returns `false` if the pair is already queued or the queue is full or
    /// closed.
    pub fn request(&self, pair: CurrencyPair) -> bool {
        if !self.pending.insert(pair.clone()) {
            return false;
        }

        match self.tx.try_send(pair) {
            Ok(()) => true,
            Err(e) => {
                let pair = e.into_inner();
                debug!(pair = %pair, "Refresh request dropped");
                self.pending.remove(&pair);
                false
            }
        }
    }
}

/// Receiving half of the refresh queue.
pub struct RefreshQueue {
    rx: mpsc::Receiver<CurrencyPair>,
    pending: Arc<DashSet<CurrencyPair>>,
}

impl RefreshQueue {
    /// Wait for the next request. `None` once every requester is gone.
    pub async fn recv(&mut self) -> Option<CurrencyPair> {
        let pair = self.rx.recv().await?;
        self.pending.remove(&pair);
        Some(pair)
    }

    /// Take a queued request if one is ready.
    pub fn try_next(&mut self) -> Option<CurrencyPair> {
        let pair = self.rx.try_recv().ok()?;
        self.pending.remove(&pair);
        Some(pair)
    }
}

/// Outcome of a [`RefreshJob::refresh_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Currencies refreshed, with the source that answered.
    pub refreshed: Vec<(Currency, RateSource)>,
    /// Currencies no source could provide.
    pub failed: Vec<Currency>,
}

impl RefreshSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetches pivot rates, persists them and invalidates cached values.
pub struct RefreshJob {
    providers: HashMap<RateSource, Arc<dyn RateProvider>>,
    store: SharedRateStore,
    cache: SharedRateCache,
    config: RefreshConfig,
}

impl RefreshJob {
    /// Create a refresh job. A later provider for the same source replaces an
    /// earlier one.
    pub fn new(
        providers: Vec<Arc<dyn RateProvider>>,
        store: Arc<dyn RateStore>,
        cache: Arc<dyn RateCache>,
        config: RefreshConfig,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.source(), provider))
            .collect();

        Self {
            providers,
            store,
            cache,
            config,
        }
    }

    pub fn pivot(&self) -> &Currency {
        &self.config.pivot
    }

    /// Refresh one pivot pair from one source.
    ///
    /// Returns `false` when the pair does not involve the pivot, the source is
    /// not registered, the fetch fails or the store rejects the record.
    #[instrument(skip_all, fields(base = %base, target = %target, source = %source))]
    pub async fn refresh_rate(&self, base: &Currency, target: &Currency, source: RateSource) -> bool {
        let pair = CurrencyPair::new(base.clone(), target.clone());
        let Some(foreign) = self.foreign_side(&pair) else {
            warn!(pair = %pair, pivot = %self.pivot(), "Refresh requires a pivot pair");
            return false;
        };

        let Some(provider) = self.providers.get(&source) else {
            warn!(source = %source, "No provider registered for source");
            return false;
        };

        let Some(record) =
            provider::fetch(provider.as_ref(), foreign, self.pivot(), self.config.fetch_timeout)
                .await
        else {
            return false;
        };

        let stored = match self.store.upsert(record).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(pair = %pair, source = %source, error = %e, "Failed to store refreshed rate");
                return false;
            }
        };

        // Cross rates derived from the old leg are cached under their own keys.
        let invalidated = self.cache.invalidate_involving(foreign);

        info!(
            id = %stored.id,
            pair = %stored.pair(),
            source = %source,
            rate = %stored.rate,
            invalidated,
            "Rate refreshed"
        );
        true
    }

    /// Refresh a pivot pair, trying sources in priority order.
    pub async fn refresh_with_fallback(&self, pair: &CurrencyPair) -> Option<RateSource> {
        for source in &self.config.priority {
            if !self.providers.contains_key(source) {
                continue;
            }
            if self.refresh_rate(&pair.base, &pair.quote, *source).await {
                return Some(*source);
            }
            debug!(pair = %pair, source = %source, "Falling back to next source");
        }

        warn!(pair = %pair, "No source could refresh pair");
        None
    }

    /// Refresh `(pivot, currency)` for every currency other than the pivot.
    #[instrument(skip_all, fields(count = currencies.len()))]
    pub async fn refresh_all(&self, currencies: &[Currency]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        for currency in currencies.iter().filter(|c| *c != self.pivot()) {
            let pair = CurrencyPair::new(self.pivot().clone(), currency.clone());
            match self.refresh_with_fallback(&pair).await {
                Some(source) => summary.refreshed.push((currency.clone(), source)),
                None => summary.failed.push(currency.clone()),
            }
        }

        info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "Refresh pass complete"
        );
        summary
    }

    /// Drain refresh requests until every requester is dropped.
    pub async fn run_worker(self: Arc<Self>, mut queue: RefreshQueue) {
        info!(pivot = %self.pivot(), "Refresh worker started");

        while let Some(pair) = queue.recv().await {
            self.refresh_with_fallback(&pair).await;
        }

        info!("Refresh worker stopped");
    }

    fn foreign_side<'a>(&self, pair: &'a CurrencyPair) -> Option<&'a Currency> {
        if pair.is_identity() {
            return None;
        }
        pair.other_side(self.pivot())
    }
}
