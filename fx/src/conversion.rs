//! Currency conversion on top of the resolver.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kurs_common::{Currency, CurrencyPair, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{FxError, FxResult};
use crate::resolver::Resolver;

/// Represents a completed currency conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    /// Input amount.
    pub input: Money,
    /// Output amount, rounded to the target currency's minor unit.
    pub output: Money,
    /// Rate applied before rounding.
    pub rate: Decimal,
    /// When the conversion was executed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Create a new conversion record.
    pub fn new(input: Money, output: Money, rate: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(),
            input,
            output,
            rate,
            executed_at: Utc::now(),
        }
    }

    /// Output per unit of input after rounding. Zero when undefined or out of
    /// range.
    pub fn effective_rate(&self) -> Decimal {
        if self.input.is_zero() {
            return Decimal::ZERO;
        }
        self.output
            .value
            .checked_div(self.input.value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Get the currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.input.currency.clone(), self.output.currency.clone())
    }
}

/// Converts money amounts using resolved rates.
#[derive(Clone)]
pub struct Converter {
    resolver: Arc<Resolver>,
}

impl Converter {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Convert `amount` into `target`.
    pub async fn convert(&self, amount: &Money, target: Currency) -> FxResult<Conversion> {
        let rate = self
            .resolver
            .get_rate(&amount.currency, &target, false)
            .await?;
        let value = amount.value.checked_mul(rate).ok_or_else(|| {
            FxError::Overflow(CurrencyPair::new(amount.currency.clone(), target.clone()))
        })?;

        let conversion = Conversion::new(amount.clone(), Money::new(value, target).round(), rate);

        info!(
            conversion_id = %conversion.id,
            input = %conversion.input,
            output = %conversion.output,
            rate = %conversion.rate,
            "Conversion executed"
        );

        Ok(conversion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryRateCache;
    use crate::config::ResolverConfig;
    use crate::store::{MemoryRateStore, RateStore};
    use kurs_common::{RateRecord, RateSource};
    use rust_decimal_macros::dec;

    async fn converter() -> Converter {
        let store = Arc::new(MemoryRateStore::new());
        for (currency, rate) in [(Currency::usd(), dec!(41.997)), (Currency::eur(), dec!(45.20))] {
            let record = RateRecord::pivot_quote(
                Currency::uah(),
                currency,
                rate,
                RateSource::CentralBank,
                serde_json::Value::Null,
            )
            .unwrap();
            store.upsert(record).await.unwrap();
        }

        let resolver = Resolver::new(
            Arc::new(MemoryRateCache::new()),
            store,
            ResolverConfig::default(),
        );
        Converter::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_convert_to_pivot() {
        let converter = converter().await;

        let conversion = converter
            .convert(&Money::new(dec!(100), Currency::usd()), Currency::uah())
            .await
            .unwrap();

        assert_eq!(conversion.output, Money::new(dec!(4199.70), Currency::uah()));
        assert_eq!(conversion.rate, dec!(41.997));
        assert_eq!(conversion.pair(), CurrencyPair::new(Currency::usd(), Currency::uah()));
    }

    #[tokio::test]
    async fn test_convert_rounds_output() {
        let converter = converter().await;

        let conversion = converter
            .convert(&Money::new(dec!(1000), Currency::uah()), Currency::usd())
            .await
            .unwrap();

        assert_eq!(conversion.output.value, dec!(23.81));
        assert!((conversion.effective_rate() - dec!(0.02381)).abs() < dec!(0.00001));
    }

    #[tokio::test]
    async fn test_cross_conversion() {
        let converter = converter().await;

        let conversion = converter
            .convert(&Money::new(dec!(100), Currency::eur()), Currency::usd())
            .await
            .unwrap();

        assert_eq!(conversion.output.currency, Currency::usd());
        assert_eq!(conversion.output.value, dec!(107.63));
    }

    #[tokio::test]
    async fn test_missing_rate() {
        let converter = converter().await;

        let result = converter
            .convert(&Money::new(dec!(100), Currency::gbp()), Currency::uah())
            .await;

        assert!(matches!(result, Err(FxError::RateNotAvailable(_))));
    }

    #[test]
    fn test_effective_rate_of_zero_input() {
        let conversion = Conversion::new(
            Money::zero(Currency::usd()),
            Money::zero(Currency::uah()),
            dec!(41.997),
        );
        assert_eq!(conversion.effective_rate(), Decimal::ZERO);
    }

    #[test]
    fn test_effective_rate_out_of_range_is_zero() {
        let conversion = Conversion::new(
            Money::new(Decimal::new(1, 28), Currency::usd()),
            Money::new(Decimal::MAX, Currency::uah()),
            dec!(41.997),
        );
        assert_eq!(conversion.effective_rate(), Decimal::ZERO);
    }
}
