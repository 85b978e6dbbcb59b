//! Durable history of rate records.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kurs_common::{CurrencyPair, RateRecord, RateSource, UpsertKey};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::FxResult;

/// Source of truth for historical rates.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recent active record stored under exactly this pair, across sources.
    async fn latest(&self, pair: &CurrencyPair) -> FxResult<Option<RateRecord>>;

    /// Atomically insert or update the row for `(base, target, source, day)`.
    ///
    /// An update keeps the existing row id, takes the new rate, convention,
    /// timestamp and payload, and reactivates the row.
    async fn upsert(&self, record: RateRecord) -> FxResult<RateRecord>;

    /// Mark every record of a retired source inactive. Returns rows changed.
    async fn deactivate_source(&self, source: RateSource) -> FxResult<u64>;
}

/// Shared rate store.
pub type SharedRateStore = Arc<dyn RateStore>;

/// In-process store keyed by the upsert tuple.
#[derive(Default)]
pub struct MemoryRateStore {
    records: RwLock<HashMap<UpsertKey, RateRecord>>,
}

impl MemoryRateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, active or not.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of all rows stored under a pair.
    pub fn records_for(&self, pair: &CurrencyPair) -> Vec<RateRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.base_currency == pair.base && r.target_currency == pair.quote)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn latest(&self, pair: &CurrencyPair) -> FxResult<Option<RateRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| {
                r.is_active && r.base_currency == pair.base && r.target_currency == pair.quote
            })
            .max_by_key(|r| r.fetched_at)
            .cloned())
    }

    async fn upsert(&self, record: RateRecord) -> FxResult<RateRecord> {
        record.validate()?;
        let key = record.upsert_key();

        // Lookup and write happen under one write guard.
        let mut records = self.records.write();
        let stored = records
            .entry(key)
            .and_modify(|existing| {
                debug!(id = %existing.id, pair = %existing.pair(), "Updating same-day record");
                existing.rate = record.rate;
                existing.convention = record.convention;
                existing.fetched_at = record.fetched_at;
                existing.raw_payload = record.raw_payload.clone();
                existing.is_active = true;
            })
            .or_insert_with(|| record.clone());

        Ok(stored.clone())
    }

    async fn deactivate_source(&self, source: RateSource) -> FxResult<u64> {
        let mut records = self.records.write();
        let mut changed = 0;
        for record in records.values_mut() {
            if record.source == source && record.is_active {
                record.is_active = false;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kurs_common::{Currency, QuoteConvention};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn record(rate: Decimal, source: RateSource, hours_ago: i64) -> RateRecord {
        RateRecord::new(
            Currency::uah(),
            Currency::usd(),
            rate,
            source,
            QuoteConvention::PivotAsBase,
            Utc::now() - Duration::hours(hours_ago),
            serde_json::json!({ "rate": rate.to_string() }),
        )
        .unwrap()
    }

    fn uah_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::uah(), Currency::usd())
    }

    #[tokio::test]
    async fn test_latest_empty() {
        let store = MemoryRateStore::new();
        assert!(store.latest(&uah_usd()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_day_upsert_keeps_one_row() {
        let store = MemoryRateStore::new();

        let first = store
            .upsert(record(dec!(41.90), RateSource::CentralBank, 0))
            .await
            .unwrap();
        let second = store
            .upsert(record(dec!(41.997), RateSource::CentralBank, 0))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(second.rate, dec!(41.997));

        let latest = store.latest(&uah_usd()).await.unwrap().unwrap();
        assert_eq!(latest.rate, dec!(41.997));
        assert_eq!(latest.raw_payload["rate"], "41.997");
    }

    #[tokio::test]
    async fn test_different_days_and_sources_are_separate_rows() {
        let store = MemoryRateStore::new();

        store
            .upsert(record(dec!(41.10), RateSource::CentralBank, 48))
            .await
            .unwrap();
        store
            .upsert(record(dec!(41.50), RateSource::CentralBank, 0))
            .await
            .unwrap();
        store
            .upsert(record(dec!(41.70), RateSource::CommercialBank, 0))
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.records_for(&uah_usd()).len(), 3);
    }

    #[tokio::test]
    async fn test_latest_picks_most_recent_across_sources() {
        let store = MemoryRateStore::new();

        store
            .upsert(record(dec!(41.10), RateSource::CentralBank, 30))
            .await
            .unwrap();
        store
            .upsert(record(dec!(41.80), RateSource::Aggregator, 2))
            .await
            .unwrap();

        let latest = store.latest(&uah_usd()).await.unwrap().unwrap();
        assert_eq!(latest.source, RateSource::Aggregator);

        // Stored direction is exact.
        assert!(store.latest(&uah_usd().inverse()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_source_is_not_served() {
        let store = MemoryRateStore::new();

        store
            .upsert(record(dec!(41.10), RateSource::CentralBank, 30))
            .await
            .unwrap();
        store
            .upsert(record(dec!(41.80), RateSource::Aggregator, 2))
            .await
            .unwrap();

        let changed = store
            .deactivate_source(RateSource::Aggregator)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let latest = store.latest(&uah_usd()).await.unwrap().unwrap();
        assert_eq!(latest.source, RateSource::CentralBank);
        // Rows are never removed.
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_record() {
        let store = MemoryRateStore::new();
        let mut bad = record(dec!(41.0), RateSource::CentralBank, 0);
        bad.rate = dec!(-1);

        assert!(store.upsert(bad).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_same_key() {
        let store = Arc::new(MemoryRateStore::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let rate = dec!(41) + Decimal::new(i, 2);
                store
                    .upsert(record(rate, RateSource::CentralBank, 0))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 1);
    }
}
