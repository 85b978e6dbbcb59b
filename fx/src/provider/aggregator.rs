//! Rate aggregator quoting many currencies against an arbitrary base.
//!
//! Payload: `{"base": "USD", "rates": {"UAH": 41.99, "EUR": 0.92, ..}}`, each
//! value being units of that currency per one unit of the base. The pivot
//! rate of `X` is therefore `rates[pivot] / rates[X]`.

use async_trait::async_trait;
use chrono::Duration;
use kurs_common::{constants, Currency, RateSource};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::instrument;

use super::{decimal_field, get_json, http_client, Quote, RateProvider};
use crate::error::{FxError, FxResult};

const SOURCE: RateSource = RateSource::Aggregator;

/// Aggregator provider configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Latest-rates endpoint.
    pub url: String,
    /// Optional API key sent as `access_key`.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            url: "https://open.er-api.com/v6/latest/USD".to_string(),
            api_key: None,
            timeout: constants::provider_fetch_timeout(),
        }
    }
}

/// Multi-currency aggregator provider.
pub struct AggregatorProvider {
    client: reqwest::Client,
    config: AggregatorConfig,
}

impl AggregatorProvider {
    pub fn new(config: AggregatorConfig) -> FxResult<Self> {
        Ok(Self {
            client: http_client(SOURCE, config.timeout)?,
            config,
        })
    }
}

/// Units of `pivot` per one unit of `currency`.
pub fn parse_pivot_rate(
    payload: &Value,
    currency: &Currency,
    pivot: &Currency,
) -> Result<Decimal, String> {
    let rates = payload
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing `rates` object".to_string())?;

    let base = payload
        .get("base")
        .or_else(|| payload.get("base_code"))
        .and_then(Value::as_str);

    let per_base = |code: &Currency| -> Result<Decimal, String> {
        match rates.get(code.code()).and_then(decimal_field) {
            Some(value) if value > Decimal::ZERO => Ok(value),
            Some(value) => Err(format!("non-positive rate {value} for {code}")),
            None if base.map_or(false, |b| b.eq_ignore_ascii_case(code.code())) => {
                Ok(Decimal::ONE)
            }
            None => Err(format!("no rate for {code}")),
        }
    };

    let pivot_per_base = per_base(pivot)?;
    let currency_per_base = per_base(currency)?;

    pivot_per_base
        .checked_div(currency_per_base)
        .ok_or_else(|| format!("cannot derive {currency} in {pivot}"))
}

#[async_trait]
impl RateProvider for AggregatorProvider {
    fn source(&self) -> RateSource {
        SOURCE
    }

    #[instrument(skip_all, fields(source = %SOURCE, currency = %currency))]
    async fn quote(&self, currency: &Currency, pivot: &Currency) -> FxResult<Quote> {
        let query: Vec<(&str, &str)> = self
            .config
            .api_key
            .as_deref()
            .map(|key| vec![("access_key", key)])
            .unwrap_or_default();

        let payload = get_json(&self.client, SOURCE, &self.config.url, &query).await?;
        let rate =
            parse_pivot_rate(&payload, currency, pivot).map_err(|e| FxError::provider(SOURCE, e))?;

        Ok(Quote {
            rate,
            raw_payload: payload,
        })
    }
}
