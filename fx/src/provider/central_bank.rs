//! National bank official rates.
//!
//! The endpoint answers `GET {url}?valcode=USD&json` with a one-element array
//! whose object carries `rate`: home-currency units per one unit of `valcode`.

use async_trait::async_trait;
use chrono::Duration;
use kurs_common::{constants, Currency, RateSource};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::instrument;

use super::{decimal_field, get_json, http_client, Quote, RateProvider};
use crate::error::{FxError, FxResult};

const SOURCE: RateSource = RateSource::CentralBank;

/// Central bank provider configuration.
#[derive(Debug, Clone)]
pub struct CentralBankConfig {
    /// Exchange endpoint.
    pub url: String,
    /// Currency the bank publishes rates in.
    pub home_currency: Currency,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CentralBankConfig {
    fn default() -> Self {
        Self {
            url: "https://bank.gov.ua/NBUStatService/v1/statdirectory/exchange".to_string(),
            home_currency: Currency::uah(),
            timeout: constants::provider_fetch_timeout(),
        }
    }
}

/// Official rate provider.
pub struct CentralBankProvider {
    client: reqwest::Client,
    config: CentralBankConfig,
}

impl CentralBankProvider {
    pub fn new(config: CentralBankConfig) -> FxResult<Self> {
        Ok(Self {
            client: http_client(SOURCE, config.timeout)?,
            config,
        })
    }
}

/// Extract the rate from the first element of the response array.
pub fn parse_rate(payload: &Value) -> Result<Decimal, String> {
    let first = payload
        .as_array()
        .and_then(|rows| rows.first())
        .ok_or_else(|| "expected a non-empty array".to_string())?;

    first
        .get("rate")
        .and_then(decimal_field)
        .ok_or_else(|| "missing or non-numeric `rate`".to_string())
}

#[async_trait]
impl RateProvider for CentralBankProvider {
    fn source(&self) -> RateSource {
        SOURCE
    }

    #[instrument(skip_all, fields(source = %SOURCE, currency = %currency))]
    async fn quote(&self, currency: &Currency, pivot: &Currency) -> FxResult<Quote> {
        if pivot != &self.config.home_currency {
            return Err(FxError::provider(
                SOURCE,
                format!("publishes only against {}", self.config.home_currency),
            ));
        }

        let payload = get_json(
            &self.client,
            SOURCE,
            &self.config.url,
            &[("valcode", currency.code()), ("json", "")],
        )
        .await?;

        let rate = parse_rate(&payload).map_err(|e| FxError::provider(SOURCE, e))?;

        Ok(Quote {
            rate,
            raw_payload: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_rate() {
        let payload = json!([{
            "r030": 840,
            "txt": "US Dollar",
            "rate": 41.997,
            "cc": "USD",
            "exchangedate": "14.03.2025"
        }]);

        assert_eq!(parse_rate(&payload), Ok(dec!(41.997)));
    }

    #[test]
    fn test_parse_rate_rejects_malformed() {
        assert!(parse_rate(&json!([])).is_err());
        assert!(parse_rate(&json!({ "rate": 41.0 })).is_err());
        assert!(parse_rate(&json!([{ "cc": "USD" }])).is_err());
    }

    #[tokio::test]
    async fn test_quote_against_foreign_pivot_fails() {
        let provider = CentralBankProvider::new(CentralBankConfig::default()).unwrap();

        let result = provider.quote(&Currency::usd(), &Currency::eur()).await;

        assert!(matches!(
            result,
            Err(FxError::ProviderError {
                provider: RateSource::CentralBank,
                ..
            })
        ));
    }
}
