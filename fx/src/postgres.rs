//! Postgres-backed rate store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kurs_common::{Currency, CurrencyPair, RateRecord, RateSource};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{FxError, FxResult};
use crate::store::RateStore;

const RECORD_COLUMNS: &str = "id, base_currency, target_currency, rate, source, convention, \
                              fetched_at, is_active, raw_payload";

/// Rate store over a `rate_records` table.
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> FxResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> FxResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Rate store schema up to date");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    base_currency: String,
    target_currency: String,
    rate: Decimal,
    source: String,
    convention: String,
    fetched_at: DateTime<Utc>,
    is_active: bool,
    raw_payload: serde_json::Value,
}

impl TryFrom<RateRow> for RateRecord {
    type Error = FxError;

    fn try_from(row: RateRow) -> FxResult<Self> {
        Ok(RateRecord {
            id: row.id,
            base_currency: Currency::parse(&row.base_currency)?,
            target_currency: Currency::parse(&row.target_currency)?,
            rate: row.rate,
            source: row.source.parse()?,
            convention: row.convention.parse()?,
            fetched_at: row.fetched_at,
            is_active: row.is_active,
            raw_payload: row.raw_payload,
        })
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    #[instrument(skip_all, fields(pair = %pair))]
    async fn latest(&self, pair: &CurrencyPair) -> FxResult<Option<RateRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM rate_records \
             WHERE base_currency = $1 AND target_currency = $2 AND is_active \
             ORDER BY fetched_at DESC LIMIT 1"
        );

        let row = sqlx::query_as::<_, RateRow>(&query)
            .bind(pair.base.code())
            .bind(pair.quote.code())
            .fetch_optional(&self.pool)
            .await?;

        row.map(RateRecord::try_from).transpose()
    }

    #[instrument(skip_all, fields(pair = %record.pair(), source = %record.source))]
    async fn upsert(&self, record: RateRecord) -> FxResult<RateRecord> {
        record.validate()?;
        let fetched_on: NaiveDate = record.fetched_on();

        // Single statement: concurrent writers for the same key serialise on
        // the unique constraint instead of racing a read.
        let query = format!(
            "INSERT INTO rate_records \
                 (id, base_currency, target_currency, rate, source, convention, \
                  fetched_at, fetched_on, is_active, raw_payload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9) \
             ON CONFLICT (base_currency, target_currency, source, fetched_on) DO UPDATE SET \
                 rate = EXCLUDED.rate, \
                 convention = EXCLUDED.convention, \
                 fetched_at = EXCLUDED.fetched_at, \
                 is_active = TRUE, \
                 raw_payload = EXCLUDED.raw_payload \
             RETURNING {RECORD_COLUMNS}"
        );

        let row = sqlx::query_as::<_, RateRow>(&query)
            .bind(record.id)
            .bind(record.base_currency.code())
            .bind(record.target_currency.code())
            .bind(record.rate)
            .bind(record.source.as_str())
            .bind(record.convention.as_str())
            .bind(record.fetched_at)
            .bind(fetched_on)
            .bind(&record.raw_payload)
            .fetch_one(&self.pool)
            .await?;

        RateRecord::try_from(row)
    }

    #[instrument(skip(self))]
    async fn deactivate_source(&self, source: RateSource) -> FxResult<u64> {
        let result = sqlx::query(
            "UPDATE rate_records SET is_active = FALSE WHERE source = $1 AND is_active",
        )
        .bind(source.as_str())
        .execute(&self.pool)
        .await?;

        info!(source = %source, rows = result.rows_affected(), "Deactivated rate source");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(source: &str) -> RateRow {
        RateRow {
            id: Uuid::now_v7(),
            base_currency: "UAH".to_string(),
            target_currency: "usd".to_string(),
            rate: dec!(41.997000),
            source: source.to_string(),
            convention: "PIVOT_AS_BASE".to_string(),
            fetched_at: Utc::now(),
            is_active: true,
            raw_payload: serde_json::json!([{ "rate": 41.997 }]),
        }
    }

    #[test]
    fn test_row_conversion() {
        let record = RateRecord::try_from(row("CENTRAL_BANK")).unwrap();
        assert_eq!(record.target_currency, Currency::usd());
        assert_eq!(record.source, RateSource::CentralBank);
        assert_eq!(record.pivot(), &Currency::uah());
    }

    #[test]
    fn test_row_with_unknown_source_is_rejected() {
        assert!(matches!(
            RateRecord::try_from(row("BROKER")),
            Err(FxError::InvalidRecord(_))
        ));
    }
}
