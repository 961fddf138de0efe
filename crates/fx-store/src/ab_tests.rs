use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{ABTest, ABTestArm, ABTestStatus, ABTestStore, ArmStats, StoreError};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct SqliteABTestStore {
    pool: SqlitePool,
}

impl SqliteABTestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_tag(status: ABTestStatus) -> &'static str {
    match status {
        ABTestStatus::Running => "running",
        ABTestStatus::Completed => "completed",
        ABTestStatus::Stopped => "stopped",
    }
}

fn parse_status(raw: &str) -> Result<ABTestStatus, StoreError> {
    match raw {
        "running" => Ok(ABTestStatus::Running),
        "completed" => Ok(ABTestStatus::Completed),
        "stopped" => Ok(ABTestStatus::Stopped),
        other => Err(StoreError::Fatal(format!("unknown ab test status: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ABTestRow {
    id: String,
    a: String,
    b: String,
    traffic_split: f64,
    status: String,
    a_trades: i64,
    a_wins: i64,
    b_trades: i64,
    b_wins: i64,
    p_value: Option<f64>,
    winner: Option<String>,
    opened_at: DateTime<Utc>,
}

impl ABTestRow {
    fn into_test(self) -> Result<ABTest, StoreError> {
        Ok(ABTest {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            a: self.a,
            b: self.b,
            traffic_split: self.traffic_split,
            status: parse_status(&self.status)?,
            a_stats: ArmStats {
                trades: self.a_trades as u32,
                wins: self.a_wins as u32,
            },
            b_stats: ArmStats {
                trades: self.b_trades as u32,
                wins: self.b_wins as u32,
            },
            p_value: self.p_value,
            winner: self.winner,
            opened_at: self.opened_at,
        })
    }
}

#[async_trait]
impl ABTestStore for SqliteABTestStore {
    async fn create(&self, test: ABTest) -> Result<ABTest, StoreError> {
        sqlx::query(
            "INSERT INTO ab_tests (id, a, b, traffic_split, status, a_trades, a_wins, b_trades,
                b_wins, p_value, winner, opened_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(test.id.to_string())
        .bind(&test.a)
        .bind(&test.b)
        .bind(test.traffic_split)
        .bind(status_tag(test.status))
        .bind(test.a_stats.trades as i64)
        .bind(test.a_stats.wins as i64)
        .bind(test.b_stats.trades as i64)
        .bind(test.b_stats.wins as i64)
        .bind(test.p_value)
        .bind(&test.winner)
        .bind(test.opened_at)
        .execute(&self.pool)
        .await?;

        Ok(test)
    }

    async fn get_active(&self) -> Result<Option<ABTest>, StoreError> {
        let row = sqlx::query_as::<_, ABTestRow>(
            "SELECT id, a, b, traffic_split, status, a_trades, a_wins, b_trades, b_wins, p_value,
                winner, opened_at
             FROM ab_tests WHERE status = 'running' ORDER BY opened_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(ABTestRow::into_test).transpose()
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        arm: ABTestArm,
        won: bool,
    ) -> Result<ArmStats, StoreError> {
        let win_increment: i64 = if won { 1 } else { 0 };

        let row: (i64, i64) = match arm {
            ABTestArm::A => {
                sqlx::query("UPDATE ab_tests SET a_trades = a_trades + 1, a_wins = a_wins + ? WHERE id = ?")
                    .bind(win_increment)
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await?;
                sqlx::query_as("SELECT a_trades, a_wins FROM ab_tests WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await?
            }
            ABTestArm::B => {
                sqlx::query("UPDATE ab_tests SET b_trades = b_trades + 1, b_wins = b_wins + ? WHERE id = ?")
                    .bind(win_increment)
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await?;
                sqlx::query_as("SELECT b_trades, b_wins FROM ab_tests WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(ArmStats {
            trades: row.0 as u32,
            wins: row.1 as u32,
        })
    }

    async fn close(
        &self,
        id: Uuid,
        winner: Option<String>,
        p_value: Option<f64>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE ab_tests SET status = 'completed', winner = ?, p_value = ? WHERE id = ?")
            .bind(&winner)
            .bind(p_value)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;

    fn test_fixture() -> ABTest {
        ABTest {
            id: Uuid::new_v4(),
            a: "v3.2".into(),
            b: "v3.3".into(),
            traffic_split: 0.5,
            status: ABTestStatus::Running,
            a_stats: ArmStats::default(),
            b_stats: ArmStats::default(),
            p_value: None,
            winner: None,
            opened_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_outcome_accumulates_per_arm() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteABTestStore::new(db.pool().clone());
        let test = test_fixture();
        store.create(test.clone()).await.unwrap();

        store.record_outcome(test.id, ABTestArm::A, true).await.unwrap();
        store.record_outcome(test.id, ABTestArm::A, false).await.unwrap();
        let stats = store.record_outcome(test.id, ABTestArm::B, true).await.unwrap();

        assert_eq!(stats.trades, 1);
        assert_eq!(stats.wins, 1);

        let active = store.get_active().await.unwrap().unwrap();
        assert_eq!(active.a_stats.trades, 2);
        assert_eq!(active.a_stats.wins, 1);
    }

    #[tokio::test]
    async fn close_marks_completed_with_winner() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteABTestStore::new(db.pool().clone());
        let test = test_fixture();
        store.create(test.clone()).await.unwrap();

        store.close(test.id, Some("v3.3".into()), Some(0.03)).await.unwrap();

        assert!(store.get_active().await.unwrap().is_none());
    }
}
