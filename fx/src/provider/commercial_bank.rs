//! Commercial bank buy/sell rates.
//!
//! The endpoint returns `[{"code": "USD", "buy": .., "sell": ..}, ..]` in the
//! bank's home currency. The stored rate is the mid of buy and sell.

use async_trait::async_trait;
use chrono::Duration;
use kurs_common::{constants, Currency, RateSource};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::instrument;

use super::{decimal_field, get_json, http_client, Quote, RateProvider};
use crate::error::{FxError, FxResult};

const SOURCE: RateSource = RateSource::CommercialBank;

/// Commercial bank provider configuration.
#[derive(Debug, Clone)]
pub struct CommercialBankConfig {
    /// Rates endpoint.
    pub url: String,
    /// Currency buy/sell prices are expressed in.
    pub home_currency: Currency,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CommercialBankConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081/v1/rates".to_string(),
            home_currency: Currency::uah(),
            timeout: constants::provider_fetch_timeout(),
        }
    }
}

/// Buy/sell rate provider.
pub struct CommercialBankProvider {
    client: reqwest::Client,
    config: CommercialBankConfig,
}

impl CommercialBankProvider {
    pub fn new(config: CommercialBankConfig) -> FxResult<Self> {
        Ok(Self {
            client: http_client(SOURCE, config.timeout)?,
            config,
        })
    }
}

/// Mid of the buy and sell prices listed for `currency`.
pub fn parse_mid_rate(payload: &Value, currency: &Currency) -> Result<Decimal, String> {
    let rows = payload
        .as_array()
        .ok_or_else(|| "expected an array".to_string())?;

    let row = rows
        .iter()
        .find(|row| {
            row.get("code")
                .and_then(Value::as_str)
                .map_or(false, |code| code.eq_ignore_ascii_case(currency.code()))
        })
        .ok_or_else(|| format!("no entry for {currency}"))?;

    let buy = row
        .get("buy")
        .and_then(decimal_field)
        .ok_or_else(|| "missing or non-numeric `buy`".to_string())?;
    let sell = row
        .get("sell")
        .and_then(decimal_field)
        .ok_or_else(|| "missing or non-numeric `sell`".to_string())?;

    if buy <= Decimal::ZERO || sell <= Decimal::ZERO {
        return Err(format!("non-positive buy/sell {buy}/{sell}"));
    }

    Ok((buy + sell) / Decimal::TWO)
}

#[async_trait]
impl RateProvider for CommercialBankProvider {
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

        let payload = get_json(&self.client, SOURCE, &self.config.url, &[]).await?;
        let rate = parse_mid_rate(&payload, currency).map_err(|e| FxError::provider(SOURCE, e))?;

        Ok(Quote {
            rate,
            raw_payload: payload,
        })
    }
}
