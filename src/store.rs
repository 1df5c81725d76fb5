//! Persistent candle storage.
//!
//! [`OhlcStore`] is the seam between the batch writer and the concrete
//! store. The Postgres implementation upserts by identity key, which makes
//! redundant flushes of already-stored records harmless no-op rewrites —
//! the correctness backstop behind the best-effort dedup filter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::ohlc::{OhlcRecord, Timeframe, missing_buckets};

/// Write/query interface to the candle table.
///
/// The only component with write access to persistent storage is the batch
/// writer; `last_seen` and `list_gaps` are the seams future backfill work
/// hangs off without touching the ingestion path.
#[async_trait]
pub trait OhlcStore {
    /// Bulk-inserts a batch in one transaction, replacing rows that share
    /// an identity key (last write wins). Returns the number of records
    /// written.
    async fn upsert_batch(&self, records: &[OhlcRecord]) -> crate::Result<u64>;

    /// Newest stored bucket start for a series, if any.
    async fn last_seen(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> crate::Result<Option<DateTime<Utc>>>;

    /// Bucket timestamps missing from storage between `since` and the
    /// newest stored bucket.
    async fn list_gaps(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> crate::Result<Vec<DateTime<Utc>>>;
}

/// Postgres/TimescaleDB-backed store.
#[derive(Debug, Clone)]
pub struct PgOhlcStore {
    pool: PgPool,
}

impl PgOhlcStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `ohlc` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`KrillError::Storage`](crate::KrillError::Storage) if the
    /// DDL fails.
    pub async fn ensure_schema(&self) -> crate::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ohlc (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                open_time TIMESTAMPTZ NOT NULL,
                open NUMERIC NOT NULL,
                high NUMERIC NOT NULL,
                low NUMERIC NOT NULL,
                close NUMERIC NOT NULL,
                volume NUMERIC NOT NULL,
                trades BIGINT NOT NULL DEFAULT 0,
                source TEXT NOT NULL,
                PRIMARY KEY (symbol, timeframe, open_time, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OhlcStore for PgOhlcStore {
    async fn upsert_batch(&self, records: &[OhlcRecord]) -> crate::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO ohlc
                    (symbol, timeframe, open_time, open, high, low, close,
                     volume, trades, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (symbol, timeframe, open_time, source) DO UPDATE
                SET open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    trades = EXCLUDED.trades
                "#,
            )
            .bind(&record.symbol)
            .bind(record.timeframe.as_str())
            .bind(record.open_time)
            .bind(record.open)
            .bind(record.high)
            .bind(record.low)
            .bind(record.close)
            .bind(record.volume)
            .bind(record.trades)
            .bind(&record.source)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(records.len() as u64)
    }

    async fn last_seen(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> crate::Result<Option<DateTime<Utc>>> {
        let newest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT max(open_time) FROM ohlc WHERE symbol = $1 AND timeframe = $2",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(newest)
    }

    async fn list_gaps(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> crate::Result<Vec<DateTime<Utc>>> {
        let observed: Vec<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT open_time FROM ohlc
            WHERE symbol = $1 AND timeframe = $2 AND open_time >= $3
            ORDER BY open_time
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(missing_buckets(&observed, timeframe.bucket(), since))
    }
}
