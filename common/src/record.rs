//! Persisted rate observations.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CommonError, Result};
use crate::monetary::{Currency, CurrencyPair};
use crate::time::{self, constants, Timestamp};

/// Decimal places kept for stored rates (`NUMERIC(18,6)`).
pub const RATE_SCALE: u32 = 6;

/// External source a rate was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    /// National bank official rate.
    CentralBank,
    /// Commercial bank cash/card rate (buy/sell).
    CommercialBank,
    /// Third-party rate aggregator.
    Aggregator,
}

impl RateSource {
    /// Fixed refresh priority, most trusted first.
    pub const PRIORITY: [RateSource; 3] = [
        RateSource::CentralBank,
        RateSource::CommercialBank,
        RateSource::Aggregator,
    ];

    /// Storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::CentralBank => "CENTRAL_BANK",
            RateSource::CommercialBank => "COMMERCIAL_BANK",
            RateSource::Aggregator => "AGGREGATOR",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateSource {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CENTRAL_BANK" => Ok(RateSource::CentralBank),
            "COMMERCIAL_BANK" => Ok(RateSource::CommercialBank),
            "AGGREGATOR" => Ok(RateSource::Aggregator),
            _ => Err(CommonError::UnknownSource(s.to_string())),
        }
    }
}

/// Which side of a stored record is the pivot currency.
///
/// Under either convention `rate` counts pivot units per one unit of the
/// other ("foreign") currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteConvention {
    /// `base_currency` is the pivot.
    PivotAsBase,
    /// `target_currency` is the pivot.
    PivotAsTarget,
}

impl QuoteConvention {
    /// Storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteConvention::PivotAsBase => "PIVOT_AS_BASE",
            QuoteConvention::PivotAsTarget => "PIVOT_AS_TARGET",
        }
    }
}

impl fmt::Display for QuoteConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteConvention {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PIVOT_AS_BASE" => Ok(QuoteConvention::PivotAsBase),
            "PIVOT_AS_TARGET" => Ok(QuoteConvention::PivotAsTarget),
            _ => Err(CommonError::UnknownConvention(s.to_string())),
        }
    }
}

/// Age classification of a stored rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    /// Classify an age against the freshness threshold (inclusive).
    pub fn classify(age: Duration, max_fresh_age: Duration) -> Self {
        if age <= max_fresh_age {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale)
    }

    /// The staler of two classifications.
    pub fn worst(self, other: Freshness) -> Freshness {
        self.max(other)
    }
}

/// Uniqueness key for stored records: one row per pair, source and UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpsertKey {
    pub base_currency: Currency,
    pub target_currency: Currency,
    pub source: RateSource,
    pub day: NaiveDate,
}

/// A dated observation of a rate from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    /// Row identifier (UUID v7).
    pub id: Uuid,
    /// Base currency of the stored pair.
    pub base_currency: Currency,
    /// Target currency of the stored pair.
    pub target_currency: Currency,
    /// Pivot units per one foreign unit.
    pub rate: Decimal,
    /// Provider that produced the observation.
    pub source: RateSource,
    /// Which side of the pair is the pivot.
    pub convention: QuoteConvention,
    /// When the provider was queried.
    pub fetched_at: Timestamp,
    /// False once the source has been retired.
    pub is_active: bool,
    /// Provider response kept for audit only.
    pub raw_payload: serde_json::Value,
}

impl RateRecord {
    /// Create a validated record. The rate is rounded to [`RATE_SCALE`].
    pub fn new(
        base_currency: Currency,
        target_currency: Currency,
        rate: Decimal,
        source: RateSource,
        convention: QuoteConvention,
        fetched_at: Timestamp,
        raw_payload: serde_json::Value,
    ) -> Result<Self> {
        let record = Self {
            id: Uuid::now_v7(),
            base_currency,
            target_currency,
            rate: rate.round_dp(RATE_SCALE),
            source,
            convention,
            fetched_at,
            is_active: true,
            raw_payload,
        };
        record.validate()?;
        Ok(record)
    }

    /// Record a provider quote fetched just now, stored with the pivot as base.
    pub fn pivot_quote(
        pivot: Currency,
        foreign: Currency,
        rate: Decimal,
        source: RateSource,
        raw_payload: serde_json::Value,
    ) -> Result<Self> {
        Self::new(
            pivot,
            foreign,
            rate,
            source,
            QuoteConvention::PivotAsBase,
            time::now(),
            raw_payload,
        )
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.rate <= Decimal::ZERO {
            return Err(CommonError::InvalidRecord(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        if self.base_currency == self.target_currency {
            return Err(CommonError::InvalidRecord(format!(
                "base and target are both {}",
                self.base_currency
            )));
        }
        if self.fetched_at > time::now() + constants::max_clock_skew() {
            return Err(CommonError::InvalidRecord(format!(
                "fetched_at {} is in the future",
                self.fetched_at
            )));
        }
        Ok(())
    }

    /// The stored pair, as persisted.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base_currency.clone(), self.target_currency.clone())
    }

    /// The pivot side declared by the convention.
    pub fn pivot(&self) -> &Currency {
        match self.convention {
            QuoteConvention::PivotAsBase => &self.base_currency,
            QuoteConvention::PivotAsTarget => &self.target_currency,
        }
    }

    /// The non-pivot side.
    pub fn foreign(&self) -> &Currency {
        match self.convention {
            QuoteConvention::PivotAsBase => &self.target_currency,
            QuoteConvention::PivotAsTarget => &self.base_currency,
        }
    }

    /// UTC calendar day of the observation.
    pub fn fetched_on(&self) -> NaiveDate {
        self.fetched_at.date_naive()
    }

    pub fn upsert_key(&self) -> UpsertKey {
        UpsertKey {
            base_currency: self.base_currency.clone(),
            target_currency: self.target_currency.clone(),
            source: self.source,
            day: self.fetched_on(),
        }
    }

    /// `now - fetched_at`.
    pub fn age(&self) -> Duration {
        time::age_of(self.fetched_at)
    }

    pub fn freshness(&self, max_fresh_age: Duration) -> Freshness {
        Freshness::classify(self.age(), max_fresh_age)
    }

    /// Rate for `pair` oriented by the record's convention.
    ///
    /// `foreign -> pivot` is the stored rate, `pivot -> foreign` its
    /// reciprocal. Any other pair is not answerable by this record.
    pub fn rate_for(&self, pair: &CurrencyPair) -> Option<Decimal> {
        let (pivot, foreign) = (self.pivot(), self.foreign());
        if &pair.base == foreign && &pair.quote == pivot {
            Some(self.rate)
        } else if &pair.base == pivot && &pair.quote == foreign {
            Decimal::ONE.checked_div(self.rate)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn uah_usd(rate: Decimal) -> RateRecord {
        RateRecord::pivot_quote(
            Currency::uah(),
            Currency::usd(),
            rate,
            RateSource::CentralBank,
            serde_json::Value::Null,
        )
        .unwrap()
    }

    #[test]
    fn test_record_invariants() {
        assert!(matches!(
            RateRecord::pivot_quote(
                Currency::uah(),
                Currency::usd(),
                dec!(0),
                RateSource::CentralBank,
                serde_json::Value::Null,
            ),
            Err(CommonError::InvalidRecord(_))
        ));

        assert!(RateRecord::pivot_quote(
            Currency::uah(),
            Currency::uah(),
            dec!(1),
            RateSource::CentralBank,
            serde_json::Value::Null,
        )
        .is_err());

        assert!(RateRecord::new(
            Currency::uah(),
            Currency::usd(),
            dec!(41.5),
            RateSource::Aggregator,
            QuoteConvention::PivotAsBase,
            time::now() + Duration::hours(1),
            serde_json::Value::Null,
        )
        .is_err());
    }

    #[test]
    fn test_orientation_pivot_as_base() {
        let record = uah_usd(dec!(41.997));
        assert_eq!(record.pivot(), &Currency::uah());
        assert_eq!(record.foreign(), &Currency::usd());

        let to_pivot = CurrencyPair::new(Currency::usd(), Currency::uah());
        assert_eq!(record.rate_for(&to_pivot), Some(dec!(41.997)));

        let from_pivot = to_pivot.inverse();
        let inverted = record.rate_for(&from_pivot).unwrap();
        assert_eq!(inverted.round_dp(5), dec!(0.02381));

        let unrelated = CurrencyPair::new(Currency::eur(), Currency::uah());
        assert_eq!(record.rate_for(&unrelated), None);
    }

    #[test]
    fn test_orientation_pivot_as_target() {
        let record = RateRecord::new(
            Currency::eur(),
            Currency::uah(),
            dec!(45.20),
            RateSource::CommercialBank,
            QuoteConvention::PivotAsTarget,
            time::now(),
            serde_json::Value::Null,
        )
        .unwrap();

        let to_pivot = CurrencyPair::new(Currency::eur(), Currency::uah());
        assert_eq!(record.rate_for(&to_pivot), Some(dec!(45.20)));
        assert!(record.rate_for(&to_pivot.inverse()).unwrap() < dec!(0.023));
    }

    #[test]
    fn test_freshness_boundary() {
        let max = constants::max_fresh_age();
        assert_eq!(Freshness::classify(Duration::hours(24), max), Freshness::Fresh);
        assert_eq!(
            Freshness::classify(Duration::hours(24) + Duration::seconds(1), max),
            Freshness::Stale
        );
        assert_eq!(Freshness::Fresh.worst(Freshness::Stale), Freshness::Stale);
    }

    #[test]
    fn test_upsert_key_uses_utc_day() {
        let record = uah_usd(dec!(41.997));
        let key = record.upsert_key();
        assert_eq!(key.day, record.fetched_at.date_naive());
        assert_eq!(key.source, RateSource::CentralBank);
    }

    #[test]
    fn test_source_names_round_trip_through_storage() {
        for source in RateSource::PRIORITY {
            assert_eq!(source.as_str().parse::<RateSource>().unwrap(), source);
        }
        assert!("BROKER".parse::<RateSource>().is_err());
        assert_eq!(
            "pivot_as_target".parse::<QuoteConvention>().unwrap(),
            QuoteConvention::PivotAsTarget
        );
    }
}
