//! Rate provider trait and shared fetch plumbing.
//!
//! Providers normalise one external source into "pivot units per one unit of
//! the requested currency". The refresh job calls [`fetch`], which bounds the
//! call with a timeout and turns every failure into `None`.

pub mod aggregator;
pub mod central_bank;
pub mod commercial_bank;

use async_trait::async_trait;
use chrono::Duration;
use kurs_common::{Currency, DurationExt, RateRecord, RateSource};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

pub use aggregator::{AggregatorConfig, AggregatorProvider};
pub use central_bank::{CentralBankConfig, CentralBankProvider};
pub use commercial_bank::{CommercialBankConfig, CommercialBankProvider};

/// A normalised provider answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Pivot units per one unit of the requested currency.
    pub rate: Decimal,
    /// Response body, kept for audit.
    pub raw_payload: Value,
}

/// Trait for external rate sources.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Which source this provider represents.
    fn source(&self) -> RateSource;

    /// Quote `currency` against `pivot`.
    async fn quote(&self, currency: &Currency, pivot: &Currency) -> FxResult<Quote>;
}

/// Fetch `currency` from `provider` as a pivot-as-base record.
///
/// Never fails: timeouts, transport errors, malformed payloads and invalid
/// rates are logged and reported as `None`.
pub async fn fetch(
    provider: &dyn RateProvider,
    currency: &Currency,
    pivot: &Currency,
    timeout: Duration,
) -> Option<RateRecord> {
    let source = provider.source();

    let quote = match tokio::time::timeout(timeout.as_std(), provider.quote(currency, pivot)).await
    {
        Ok(Ok(quote)) => quote,
        Ok(Err(e)) => {
            warn!(source = %source, currency = %currency, error = %e, "Provider fetch failed");
            return None;
        }
        Err(_) => {
            let e = FxError::ProviderTimeout(source);
            warn!(
                source = %source,
                currency = %currency,
                timeout_ms = timeout.num_milliseconds(),
                error = %e,
                "Provider fetch failed"
            );
            return None;
        }
    };

    match RateRecord::pivot_quote(
        pivot.clone(),
        currency.clone(),
        quote.rate,
        source,
        quote.raw_payload,
    ) {
        Ok(record) => {
            debug!(source = %source, currency = %currency, rate = %record.rate, "Provider quote normalised");
            Some(record)
        }
        Err(e) => {
            warn!(source = %source, currency = %currency, error = %e, "Provider returned unusable rate");
            None
        }
    }
}

/// Read a decimal from a JSON number or numeric string.
///
/// Numbers go through their shortest textual form so `41.997` stays exact.
pub(crate) fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// GET `url` and decode the body as JSON, mapping failures to provider errors.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    source: RateSource,
    url: &str,
    query: &[(&str, &str)],
) -> FxResult<Value> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| FxError::provider(source, e))?;

    let response = response
        .error_for_status()
        .map_err(|e| FxError::provider(source, e))?;

    response
        .json::<Value>()
        .await
        .map_err(|e| FxError::provider(source, format!("malformed payload: {e}")))
}

/// Build an HTTP client with the provider's request timeout.
pub(crate) fn http_client(source: RateSource, timeout: Duration) -> FxResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout.as_std())
        .build()
        .map_err(|e| FxError::provider(source, format!("HTTP client setup failed: {e}")))
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    source: RateSource,
    rates: dashmap::DashMap<Currency, Decimal>,
    delay: parking_lot::Mutex<Option<std::time::Duration>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(source: RateSource) -> Self {
        Self {
            source,
            rates: dashmap::DashMap::new(),
            delay: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the pivot rate returned for a currency.
    pub fn set_rate(&self, currency: Currency, rate: Decimal) {
        self.rates.insert(currency, rate);
    }

    /// Delay every answer, to exercise timeouts.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of quote calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn source(&self) -> RateSource {
        self.source
    }

    async fn quote(&self, currency: &Currency, _pivot: &Currency) -> FxResult<Quote> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.rates
            .get(currency)
            .map(|rate| Quote {
                rate: *rate,
                raw_payload: serde_json::json!({ "mock": currency.code(), "rate": rate.to_string() }),
            })
            .ok_or_else(|| FxError::provider(self.source, format!("no rate for {currency}")))
    }
}
