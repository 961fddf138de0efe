use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{Factors, Pair, Signal, SignalOutcome, SignalStatus, SignalStore, StoreError, Timeframe};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{direction_tag, parse_direction, parse_timeframe, timeframe_tag};

pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_tag(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Active => "active",
        SignalStatus::Closed => "closed",
        SignalStatus::Expired => "expired",
    }
}

fn parse_status(raw: &str) -> Result<SignalStatus, StoreError> {
    match raw {
        "active" => Ok(SignalStatus::Active),
        "closed" => Ok(SignalStatus::Closed),
        "expired" => Ok(SignalStatus::Expired),
        other => Err(StoreError::Fatal(format!("unknown signal status: {other}"))),
    }
}

fn outcome_tag(outcome: SignalOutcome) -> &'static str {
    match outcome {
        SignalOutcome::Pending => "pending",
        SignalOutcome::Win => "win",
        SignalOutcome::Loss => "loss",
        SignalOutcome::Breakeven => "breakeven",
    }
}

fn parse_outcome(raw: &str) -> Result<SignalOutcome, StoreError> {
    match raw {
        "pending" => Ok(SignalOutcome::Pending),
        "win" => Ok(SignalOutcome::Win),
        "loss" => Ok(SignalOutcome::Loss),
        "breakeven" => Ok(SignalOutcome::Breakeven),
        other => Err(StoreError::Fatal(format!("unknown signal outcome: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: String,
    pair: String,
    timeframe: String,
    direction: String,
    confidence: f64,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    factors_json: String,
    model_version: String,
    ab_test_id: Option<String>,
    created_at: DateTime<Utc>,
    status: String,
    actual_outcome: String,
    actual_pnl: Option<f64>,
}

impl SignalRow {
    fn into_signal(self) -> Result<Signal, StoreError> {
        Ok(Signal {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            pair: Pair::new(&self.pair).map_err(|e| StoreError::Fatal(e.to_string()))?,
            timeframe: parse_timeframe(&self.timeframe)?,
            direction: parse_direction(&self.direction)?,
            confidence: self.confidence,
            entry: self.entry,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            factors: serde_json::from_str::<Factors>(&self.factors_json)
                .map_err(|e| StoreError::Fatal(e.to_string()))?,
            model_version: self.model_version,
            ab_test_id: self
                .ab_test_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| StoreError::Fatal(e.to_string()))?,
            created_at: self.created_at,
            status: parse_status(&self.status)?,
            actual_outcome: parse_outcome(&self.actual_outcome)?,
            actual_pnl: self.actual_pnl,
        })
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn create(&self, signal: Signal) -> Result<Signal, StoreError> {
        let factors_json =
            serde_json::to_string(&signal.factors).map_err(|e| StoreError::Fatal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO signals (id, pair, timeframe, direction, confidence, entry, stop_loss,
                take_profit, factors_json, model_version, ab_test_id, created_at, status,
                actual_outcome, actual_pnl)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(signal.id.to_string())
        .bind(signal.pair.as_str())
        .bind(timeframe_tag(signal.timeframe))
        .bind(direction_tag(signal.direction))
        .bind(signal.confidence)
        .bind(signal.entry)
        .bind(signal.stop_loss)
        .bind(signal.take_profit)
        .bind(&factors_json)
        .bind(&signal.model_version)
        .bind(signal.ab_test_id.map(|id| id.to_string()))
        .bind(signal.created_at)
        .bind(status_tag(signal.status))
        .bind(outcome_tag(signal.actual_outcome))
        .bind(signal.actual_pnl)
        .execute(&self.pool)
        .await?;

        Ok(signal)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Signal>, StoreError> {
        let row = sqlx::query_as::<_, SignalRow>(
            "SELECT id, pair, timeframe, direction, confidence, entry, stop_loss, take_profit,
                factors_json, model_version, ab_test_id, created_at, status, actual_outcome, actual_pnl
             FROM signals WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignalRow::into_signal).transpose()
    }

    async fn get_latest(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Signal>, StoreError> {
        let row = sqlx::query_as::<_, SignalRow>(
            "SELECT id, pair, timeframe, direction, confidence, entry, stop_loss, take_profit,
                factors_json, model_version, ab_test_id, created_at, status, actual_outcome, actual_pnl
             FROM signals WHERE pair = ? AND timeframe = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(pair.as_str())
        .bind(timeframe_tag(timeframe))
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignalRow::into_signal).transpose()
    }

    async fn mark_closed(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE signals SET status = ? WHERE id = ?")
            .bind(status_tag(SignalStatus::Closed))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: SignalOutcome,
        pnl: Option<f64>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE signals SET actual_outcome = ?, actual_pnl = ? WHERE id = ?")
            .bind(outcome_tag(outcome))
            .bind(pnl)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
