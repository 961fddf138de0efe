use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{
    NotificationLevel, Pair, Position, PositionMonitoringRecord, PositionOrigin, PositionResult,
    PositionStatus, PositionStore, Recommendation, StoreError,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{direction_tag, parse_direction};

pub struct SqlitePositionStore {
    pool: SqlitePool,
}

impl SqlitePositionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_tag(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "open",
        PositionStatus::Closed => "closed",
        PositionStatus::Cancelled => "cancelled",
    }
}

fn parse_status(raw: &str) -> Result<PositionStatus, StoreError> {
    match raw {
        "open" => Ok(PositionStatus::Open),
        "closed" => Ok(PositionStatus::Closed),
        "cancelled" => Ok(PositionStatus::Cancelled),
        other => Err(StoreError::Fatal(format!("unknown position status: {other}"))),
    }
}

fn result_tag(result: PositionResult) -> &'static str {
    match result {
        PositionResult::Win => "win",
        PositionResult::Loss => "loss",
        PositionResult::Breakeven => "breakeven",
    }
}

fn parse_result(raw: &str) -> Result<PositionResult, StoreError> {
    match raw {
        "win" => Ok(PositionResult::Win),
        "loss" => Ok(PositionResult::Loss),
        "breakeven" => Ok(PositionResult::Breakeven),
        other => Err(StoreError::Fatal(format!("unknown position result: {other}"))),
    }
}

fn recommendation_tag(rec: Recommendation) -> &'static str {
    match rec {
        Recommendation::Hold => "hold",
        Recommendation::Exit => "exit",
        Recommendation::TakePartial => "take_partial",
        Recommendation::AdjustSl => "adjust_sl",
    }
}

fn parse_recommendation(raw: &str) -> Result<Recommendation, StoreError> {
    match raw {
        "hold" => Ok(Recommendation::Hold),
        "exit" => Ok(Recommendation::Exit),
        "take_partial" => Ok(Recommendation::TakePartial),
        "adjust_sl" => Ok(Recommendation::AdjustSl),
        other => Err(StoreError::Fatal(format!("unknown recommendation: {other}"))),
    }
}

fn level_tag(level: NotificationLevel) -> &'static str {
    match level {
        NotificationLevel::L1Critical => "l1",
        NotificationLevel::L2Important => "l2",
        NotificationLevel::L3General => "l3",
        NotificationLevel::L4Summary => "l4",
    }
}

fn parse_level(raw: &str) -> Result<NotificationLevel, StoreError> {
    match raw {
        "l1" => Ok(NotificationLevel::L1Critical),
        "l2" => Ok(NotificationLevel::L2Important),
        "l3" => Ok(NotificationLevel::L3General),
        "l4" => Ok(NotificationLevel::L4Summary),
        other => Err(StoreError::Fatal(format!("unknown notification level: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: String,
    parent_id: Option<String>,
    user_id: String,
    origin_kind: String,
    origin_signal_id: Option<String>,
    pair: String,
    direction: String,
    entry: f64,
    opened_at: DateTime<Utc>,
    size: f64,
    stop_loss: f64,
    take_profit: f64,
    close_price: Option<f64>,
    closed_at: Option<DateTime<Utc>>,
    status: String,
    result: Option<String>,
    pips: Option<f64>,
    pnl: Option<f64>,
    pnl_pct: Option<f64>,
}

impl PositionRow {
    fn into_position(self) -> Result<Position, StoreError> {
        let origin = match self.origin_kind.as_str() {
            "manual" => PositionOrigin::Manual,
            "from_signal" => {
                let raw = self.origin_signal_id.ok_or_else(|| {
                    StoreError::Fatal("from_signal origin missing signal id".into())
                })?;
                PositionOrigin::FromSignal(
                    Uuid::parse_str(&raw).map_err(|e| StoreError::Fatal(e.to_string()))?,
                )
            }
            other => return Err(StoreError::Fatal(format!("unknown position origin: {other}"))),
        };

        Ok(Position {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            parent_id: self
                .parent_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| StoreError::Fatal(e.to_string()))?,
            user_id: Uuid::parse_str(&self.user_id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            origin,
            pair: Pair::new(&self.pair).map_err(|e| StoreError::Fatal(e.to_string()))?,
            direction: parse_direction(&self.direction)?,
            entry: self.entry,
            opened_at: self.opened_at,
            size: self.size,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            close_price: self.close_price,
            closed_at: self.closed_at,
            status: parse_status(&self.status)?,
            result: self.result.map(|s| parse_result(&s)).transpose()?,
            pips: self.pips,
            pnl: self.pnl,
            pnl_pct: self.pnl_pct,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MonitoringRow {
    id: String,
    position_id: String,
    ts: DateTime<Utc>,
    current_price: f64,
    unrealized_pips: f64,
    unrealized_pct: f64,
    trend_dir: String,
    trend_strength: f64,
    reversal_prob: f64,
    recommendation: String,
    confidence: f64,
    rationale: String,
    notification_sent: bool,
    notification_level: Option<String>,
}

impl MonitoringRow {
    fn into_record(self) -> Result<PositionMonitoringRecord, StoreError> {
        Ok(PositionMonitoringRecord {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            position_id: Uuid::parse_str(&self.position_id)
                .map_err(|e| StoreError::Fatal(e.to_string()))?,
            ts: self.ts,
            current_price: self.current_price,
            unrealized_pips: self.unrealized_pips,
            unrealized_pct: self.unrealized_pct,
            trend_dir: parse_direction(&self.trend_dir)?,
            trend_strength: self.trend_strength,
            reversal_prob: self.reversal_prob,
            recommendation: parse_recommendation(&self.recommendation)?,
            confidence: self.confidence,
            rationale: self.rationale,
            notification_sent: self.notification_sent,
            notification_level: self.notification_level.map(|s| parse_level(&s)).transpose()?,
        })
    }
}

#[async_trait]
impl PositionStore for SqlitePositionStore {
    async fn create(&self, position: Position) -> Result<Position, StoreError> {
        let (origin_kind, origin_signal_id) = match position.origin {
            PositionOrigin::Manual => ("manual", None),
            PositionOrigin::FromSignal(id) => ("from_signal", Some(id.to_string())),
        };

        sqlx::query(
            "INSERT INTO positions (id, parent_id, user_id, origin_kind, origin_signal_id, pair,
                direction, entry, opened_at, size, stop_loss, take_profit, close_price, closed_at,
                status, result, pips, pnl, pnl_pct)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(position.id.to_string())
        .bind(position.parent_id.map(|id| id.to_string()))
        .bind(position.user_id.to_string())
        .bind(origin_kind)
        .bind(origin_signal_id)
        .bind(position.pair.as_str())
        .bind(direction_tag(position.direction))
        .bind(position.entry)
        .bind(position.opened_at)
        .bind(position.size)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.close_price)
        .bind(position.closed_at)
        .bind(status_tag(position.status))
        .bind(position.result.map(result_tag))
        .bind(position.pips)
        .bind(position.pnl)
        .bind(position.pnl_pct)
        .execute(&self.pool)
        .await?;

        Ok(position)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query_as::<_, PositionRow>(
            "SELECT id, parent_id, user_id, origin_kind, origin_signal_id, pair, direction, entry,
                opened_at, size, stop_loss, take_profit, close_price, closed_at, status, result,
                pips, pnl, pnl_pct
             FROM positions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PositionRow::into_position).transpose()
    }

    async fn list_open(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT id, parent_id, user_id, origin_kind, origin_signal_id, pair, direction, entry,
                opened_at, size, stop_loss, take_profit, close_price, closed_at, status, result,
                pips, pnl, pnl_pct
             FROM positions WHERE status = 'open'",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn list_open_for_user(&self, user_id: Uuid) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT id, parent_id, user_id, origin_kind, origin_signal_id, pair, direction, entry,
                opened_at, size, stop_loss, take_profit, close_price, closed_at, status, result,
                pips, pnl, pnl_pct
             FROM positions WHERE status = 'open' AND user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn update_stop_loss(&self, id: Uuid, stop_loss: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET stop_loss = ? WHERE id = ?")
            .bind(stop_loss)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_take_profit(&self, id: Uuid, take_profit: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET take_profit = ? WHERE id = ?")
            .bind(take_profit)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_size(&self, id: Uuid, size: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET size = ? WHERE id = ?")
            .bind(size)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(
        &self,
        id: Uuid,
        close_price: f64,
        closed_at: DateTime<Utc>,
        status: PositionStatus,
        result: Option<PositionResult>,
        pips: Option<f64>,
        pnl: Option<f64>,
        pnl_pct: Option<f64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE positions SET close_price = ?, closed_at = ?, status = ?, result = ?,
                pips = ?, pnl = ?, pnl_pct = ? WHERE id = ?",
        )
        .bind(close_price)
        .bind(closed_at)
        .bind(status_tag(status))
        .bind(result.map(result_tag))
        .bind(pips)
        .bind(pnl)
        .bind(pnl_pct)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_monitoring(
        &self,
        record: PositionMonitoringRecord,
    ) -> Result<PositionMonitoringRecord, StoreError> {
        sqlx::query(
            "INSERT INTO position_monitoring (id, position_id, ts, current_price, unrealized_pips,
                unrealized_pct, trend_dir, trend_strength, reversal_prob, recommendation,
                confidence, rationale, notification_sent, notification_level)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.position_id.to_string())
        .bind(record.ts)
        .bind(record.current_price)
        .bind(record.unrealized_pips)
        .bind(record.unrealized_pct)
        .bind(direction_tag(record.trend_dir))
        .bind(record.trend_strength)
        .bind(record.reversal_prob)
        .bind(recommendation_tag(record.recommendation))
        .bind(record.confidence)
        .bind(&record.rationale)
        .bind(record.notification_sent)
        .bind(record.notification_level.map(level_tag))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn last_monitoring(
        &self,
        position_id: Uuid,
    ) -> Result<Option<PositionMonitoringRecord>, StoreError> {
        let row = sqlx::query_as::<_, MonitoringRow>(
            "SELECT id, position_id, ts, current_price, unrealized_pips, unrealized_pct,
                trend_dir, trend_strength, reversal_prob, recommendation, confidence, rationale,
                notification_sent, notification_level
             FROM position_monitoring WHERE position_id = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(position_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MonitoringRow::into_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;
    use fx_core::Direction;

    fn sample_position(pair: &Pair) -> Position {
        Position {
            id: Uuid::new_v4(),
            parent_id: None,
            user_id: Uuid::new_v4(),
            origin: PositionOrigin::Manual,
            pair: pair.clone(),
            direction: Direction::Long,
            entry: 1.08,
            opened_at: Utc::now(),
            size: 10.0,
            stop_loss: 1.078,
            take_profit: 1.086,
            close_price: None,
            closed_at: None,
            status: PositionStatus::Open,
            result: None,
            pips: None,
            pnl: None,
            pnl_pct: None,
        }
    }

    #[tokio::test]
    async fn create_then_list_open_round_trips() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqlitePositionStore::new(db.pool().clone());
        let pair = Pair::new("EUR/USD").unwrap();
        let position = sample_position(&pair);
        store.create(position.clone()).await.unwrap();

        let open = store.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, position.id);
    }

    #[tokio::test]
    async fn close_removes_from_open_list() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqlitePositionStore::new(db.pool().clone());
        let pair = Pair::new("EUR/USD").unwrap();
        let position = sample_position(&pair);
        store.create(position.clone()).await.unwrap();

        store
            .close(
                position.id,
                1.085,
                Utc::now(),
                PositionStatus::Closed,
                Some(PositionResult::Win),
                Some(50.0),
                Some(50.0),
                Some(0.46),
            )
            .await
            .unwrap();

        assert!(store.list_open().await.unwrap().is_empty());
        let fetched = store.get(position.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PositionStatus::Closed);
        assert_eq!(fetched.result, Some(PositionResult::Win));
    }

    #[tokio::test]
    async fn update_size_and_take_profit_persist() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqlitePositionStore::new(db.pool().clone());
        let pair = Pair::new("EUR/USD").unwrap();
        let position = sample_position(&pair);
        store.create(position.clone()).await.unwrap();

        store.update_size(position.id, 6.0).await.unwrap();
        store.update_take_profit(position.id, 1.0900).await.unwrap();

        let fetched = store.get(position.id).await.unwrap().unwrap();
        assert_eq!(fetched.size, 6.0);
        assert_eq!(fetched.take_profit, 1.0900);
    }

    #[tokio::test]
    async fn from_signal_origin_round_trips() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqlitePositionStore::new(db.pool().clone());
        let pair = Pair::new("EUR/USD").unwrap();
        let mut position = sample_position(&pair);
        let signal_id = Uuid::new_v4();
        position.origin = PositionOrigin::FromSignal(signal_id);
        store.create(position.clone()).await.unwrap();

        let fetched = store.get(position.id).await.unwrap().unwrap();
        assert_eq!(fetched.origin, PositionOrigin::FromSignal(signal_id));
    }
}
