use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{
    Direction, NotificationLevel, NotificationReceipt, NotificationStore, Pair, ReceiptSubject,
    StoreError, Timeframe,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{direction_tag, parse_direction, timeframe_tag};

pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
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

/// Notification receipts aren't naturally keyed to a `(pair, timeframe)` —
/// that context only exists for signals, not positions. `last_sent_for_pair`
/// therefore joins through `signals` for signal-subject receipts; position
/// receipts carry no pair/timeframe today and are excluded from that query
/// (position-monitor cooldown state lives in `position_monitoring` instead).
#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn record_receipt(
        &self,
        receipt: NotificationReceipt,
    ) -> Result<NotificationReceipt, StoreError> {
        let (subject_kind, subject_id) = match receipt.subject {
            ReceiptSubject::Signal(id) => ("signal", id),
            ReceiptSubject::Position(id) => ("position", id),
        };

        sqlx::query(
            "INSERT INTO notification_receipts (id, subject_kind, subject_id, user_id, channel,
                sent_at, level)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(receipt.id.to_string())
        .bind(subject_kind)
        .bind(subject_id.to_string())
        .bind(receipt.user_id.to_string())
        .bind(&receipt.channel)
        .bind(receipt.sent_at)
        .bind(level_tag(receipt.level))
        .execute(&self.pool)
        .await?;

        Ok(receipt)
    }

    async fn last_sent(
        &self,
        user_id: Uuid,
        subject: ReceiptSubject,
        level: NotificationLevel,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let (subject_kind, subject_id) = match subject {
            ReceiptSubject::Signal(id) => ("signal", id),
            ReceiptSubject::Position(id) => ("position", id),
        };

        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT sent_at FROM notification_receipts
             WHERE user_id = ? AND subject_kind = ? AND subject_id = ? AND level = ?
             ORDER BY sent_at DESC LIMIT 1",
        )
        .bind(user_id.to_string())
        .bind(subject_kind)
        .bind(subject_id.to_string())
        .bind(level_tag(level))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ts,)| ts))
    }

    async fn last_sent_for_pair(
        &self,
        user_id: Uuid,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<(Direction, DateTime<Utc>)>, StoreError> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT s.direction, r.sent_at FROM notification_receipts r
             JOIN signals s ON s.id = r.subject_id
             WHERE r.user_id = ? AND r.subject_kind = 'signal' AND s.pair = ? AND s.timeframe = ?
             ORDER BY r.sent_at DESC LIMIT 1",
        )
        .bind(user_id.to_string())
        .bind(pair.as_str())
        .bind(timeframe_tag(timeframe))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(direction, sent_at)| Ok((parse_direction(&direction)?, sent_at)))
            .transpose()
    }

    async fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u32, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notification_receipts WHERE user_id = ? AND sent_at >= ?",
        )
        .bind(user_id.to_string())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }
}
