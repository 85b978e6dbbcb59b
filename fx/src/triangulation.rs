//! Cross rates through the pivot currency.

use async_trait::async_trait;
use kurs_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::resolver::{Origin, Resolved};

/// Resolves single legs `X -> pivot` without triangulating further.
#[async_trait]
pub trait PivotLegs: Send + Sync {
    async fn leg_to_pivot(&self, currency: &Currency) -> FxResult<Resolved>;
}

/// `rate(A -> B) = rate(A -> pivot) / rate(B -> pivot)`.
pub fn cross_rate(a_to_pivot: Decimal, b_to_pivot: Decimal) -> Option<Decimal> {
    if b_to_pivot.is_zero() {
        return None;
    }
    a_to_pivot.checked_div(b_to_pivot)
}

/// Derives rates between two non-pivot currencies.
#[derive(Debug, Clone)]
pub struct Triangulator {
    pivot: Currency,
}

impl Triangulator {
    pub fn new(pivot: Currency) -> Self {
        Self { pivot }
    }

    /// Triangulate `a -> b`. Both currencies must differ from the pivot.
    ///
    /// Both legs are always looked up, so a missing first leg does not hide
    /// a missing or stale second one.
    pub async fn triangulate(
        &self,
        legs: &dyn PivotLegs,
        a: &Currency,
        b: &Currency,
    ) -> FxResult<Resolved> {
        let pair = CurrencyPair::new(a.clone(), b.clone());
        if pair.involves(&self.pivot) {
            return Err(FxError::RateNotAvailable(pair));
        }

        let not_available = || FxError::RateNotAvailable(pair.clone());
        let leg_a = legs.leg_to_pivot(a).await;
        let leg_b = legs.leg_to_pivot(b).await;
        let (Ok(leg_a), Ok(leg_b)) = (leg_a, leg_b) else {
            return Err(not_available());
        };

        let rate = cross_rate(leg_a.rate, leg_b.rate).ok_or_else(not_available)?;

        debug!(
            pair = %pair,
            pivot = %self.pivot,
            leg_a = %leg_a.rate,
            leg_b = %leg_b.rate,
            rate = %rate,
            "Triangulated cross rate"
        );

        Ok(Resolved {
            rate,
            freshness: leg_a.freshness.worst(leg_b.freshness),
            origin: Origin::Triangulated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurs_common::Freshness;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedLegs(HashMap<Currency, (Decimal, Freshness)>);

    #[async_trait]
    impl PivotLegs for FixedLegs {
        async fn leg_to_pivot(&self, currency: &Currency) -> FxResult<Resolved> {
            self.0
                .get(currency)
                .map(|(rate, freshness)| Resolved {
                    rate: *rate,
                    freshness: *freshness,
                    origin: Origin::Store,
                })
                .ok_or_else(|| {
                    FxError::RateNotAvailable(CurrencyPair::new(currency.clone(), Currency::uah()))
                })
        }
    }

    fn legs() -> FixedLegs {
        FixedLegs(HashMap::from([
            (Currency::eur(), (dec!(45.20), Freshness::Fresh)),
            (Currency::gbp(), (dec!(52.40), Freshness::Stale)),
            (Currency::usd(), (dec!(41.997), Freshness::Fresh)),
        ]))
    }

    #[tokio::test]
    async fn test_triangulate_via_pivot() {
        let triangulator = Triangulator::new(Currency::uah());

        let eur_usd = triangulator
            .triangulate(&legs(), &Currency::eur(), &Currency::usd())
            .await
            .unwrap();

        assert_eq!(eur_usd.rate, dec!(45.20) / dec!(41.997));
        assert_eq!(eur_usd.freshness, Freshness::Fresh);
        assert_eq!(eur_usd.origin, Origin::Triangulated);
    }

    #[tokio::test]
    async fn test_stale_leg_makes_result_stale() {
        let triangulator = Triangulator::new(Currency::uah());

        let eur_gbp = triangulator
            .triangulate(&legs(), &Currency::eur(), &Currency::gbp())
            .await
            .unwrap();

        assert_eq!(eur_gbp.freshness, Freshness::Stale);
    }

    #[tokio::test]
    async fn test_missing_leg_is_not_available() {
        let triangulator = Triangulator::new(Currency::uah());

        let result = triangulator
            .triangulate(&legs(), &Currency::eur(), &Currency::pln())
            .await;

        match result {
            Err(FxError::RateNotAvailable(pair)) => {
                assert_eq!(pair, CurrencyPair::new(Currency::eur(), Currency::pln()));
            }
            other => panic!("expected RateNotAvailable, got {:?}", other),
        }
    }

    struct RecordingLegs {
        inner: FixedLegs,
        asked: parking_lot::Mutex<Vec<Currency>>,
    }

    #[async_trait]
    impl PivotLegs for RecordingLegs {
        async fn leg_to_pivot(&self, currency: &Currency) -> FxResult<Resolved> {
            self.asked.lock().push(currency.clone());
            self.inner.leg_to_pivot(currency).await
        }
    }

    #[tokio::test]
    async fn test_missing_first_leg_still_looks_up_second() {
        let triangulator = Triangulator::new(Currency::uah());
        let legs = RecordingLegs {
            inner: legs(),
            asked: parking_lot::Mutex::new(Vec::new()),
        };

        let result = triangulator
            .triangulate(&legs, &Currency::pln(), &Currency::gbp())
            .await;

        assert!(matches!(result, Err(FxError::RateNotAvailable(_))));
        assert_eq!(*legs.asked.lock(), vec![Currency::pln(), Currency::gbp()]);
    }

    #[tokio::test]
    async fn test_pivot_pair_is_refused() {
        let triangulator = Triangulator::new(Currency::uah());
        assert!(triangulator
            .triangulate(&legs(), &Currency::eur(), &Currency::uah())
            .await
            .is_err());
    }

    #[test]
    fn test_zero_leg() {
        assert_eq!(cross_rate(dec!(45.2), Decimal::ZERO), None);
    }

    proptest! {
        #[test]
        fn prop_cross_rates_are_reciprocal(a in 1u32..10_000_000, b in 1u32..10_000_000) {
            let a = Decimal::new(a.into(), 4);
            let b = Decimal::new(b.into(), 4);

            let ab = cross_rate(a, b).unwrap();
            let ba = cross_rate(b, a).unwrap();

            let product = ab * ba;
            prop_assert!((product - Decimal::ONE).abs() < dec!(0.000000001));
        }
    }
}
