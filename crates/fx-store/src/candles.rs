use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{Candle, CandleStore, Pair, StoreError, Timeframe};
use sqlx::SqlitePool;

use crate::timeframe_tag;

pub struct SqliteCandleStore {
    pool: SqlitePool,
}

impl SqliteCandleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CandleRow {
    pair: String,
    timeframe: String,
    ts: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
    source: String,
    real_time: bool,
    expires_at: DateTime<Utc>,
}

impl CandleRow {
    fn into_candle(self) -> Result<Candle, StoreError> {
        Ok(Candle {
            pair: Pair::new(&self.pair).map_err(|e| StoreError::Fatal(e.to_string()))?,
            timeframe: crate::parse_timeframe(&self.timeframe)?,
            ts: self.ts,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            source: self.source,
            real_time: self.real_time,
            expires_at: self.expires_at,
        })
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    async fn upsert(&self, candles: Vec<Candle>) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for candle in &candles {
            sqlx::query(
                "INSERT INTO candles (pair, timeframe, ts, open, high, low, close, volume, source, real_time, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (pair, timeframe, ts) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    source = excluded.source,
                    real_time = excluded.real_time,
                    expires_at = excluded.expires_at",
            )
            .bind(candle.pair.as_str())
            .bind(timeframe_tag(candle.timeframe))
            .bind(candle.ts)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .bind(&candle.source)
            .bind(candle.real_time)
            .bind(candle.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_latest(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Candle>, StoreError> {
        let row = sqlx::query_as::<_, CandleRow>(
            "SELECT pair, timeframe, ts, open, high, low, close, volume, source, real_time, expires_at
             FROM candles WHERE pair = ? AND timeframe = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(pair.as_str())
        .bind(timeframe_tag(timeframe))
        .fetch_optional(&self.pool)
        .await?;

        row.map(CandleRow::into_candle).transpose()
    }

    async fn get_range(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query_as::<_, CandleRow>(
            "SELECT pair, timeframe, ts, open, high, low, close, volume, source, real_time, expires_at
             FROM candles WHERE pair = ? AND timeframe = ? AND ts >= ? AND ts <= ?
             ORDER BY ts ASC",
        )
        .bind(pair.as_str())
        .bind(timeframe_tag(timeframe))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CandleRow::into_candle).collect()
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM candles WHERE real_time = 1 AND expires_at < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
