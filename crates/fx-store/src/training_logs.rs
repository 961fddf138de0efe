use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{ModelVersionKind, StoreError, TrainingLog, TrainingLogStore, TrainingOutcome};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct SqliteTrainingLogStore {
    pool: SqlitePool,
}

impl SqliteTrainingLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn kind_tag(kind: ModelVersionKind) -> &'static str {
    match kind {
        ModelVersionKind::Full => "full",
        ModelVersionKind::Incremental => "incremental",
    }
}

fn parse_kind(raw: &str) -> Result<ModelVersionKind, StoreError> {
    match raw {
        "full" => Ok(ModelVersionKind::Full),
        "incremental" => Ok(ModelVersionKind::Incremental),
        other => Err(StoreError::Fatal(format!("unknown training kind: {other}"))),
    }
}

fn outcome_tag(outcome: TrainingOutcome) -> &'static str {
    match outcome {
        TrainingOutcome::Success => "success",
        TrainingOutcome::Failure => "failure",
    }
}

fn parse_outcome(raw: &str) -> Result<TrainingOutcome, StoreError> {
    match raw {
        "success" => Ok(TrainingOutcome::Success),
        "failure" => Ok(TrainingOutcome::Failure),
        other => Err(StoreError::Fatal(format!("unknown training outcome: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct TrainingLogRow {
    id: String,
    kind: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<String>,
    detail: String,
    resulting_version: Option<String>,
}

impl TrainingLogRow {
    fn into_log(self) -> Result<TrainingLog, StoreError> {
        Ok(TrainingLog {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            kind: parse_kind(&self.kind)?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            outcome: self.outcome.map(|s| parse_outcome(&s)).transpose()?,
            detail: self.detail,
            resulting_version: self.resulting_version,
        })
    }
}

#[async_trait]
impl TrainingLogStore for SqliteTrainingLogStore {
    async fn record_start(&self, log: TrainingLog) -> Result<TrainingLog, StoreError> {
        sqlx::query(
            "INSERT INTO training_logs (id, kind, started_at, finished_at, outcome, detail,
                resulting_version)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.id.to_string())
        .bind(kind_tag(log.kind))
        .bind(log.started_at)
        .bind(log.finished_at)
        .bind(log.outcome.map(outcome_tag))
        .bind(&log.detail)
        .bind(&log.resulting_version)
        .execute(&self.pool)
        .await?;

        Ok(log)
    }

    async fn record_finish(
        &self,
        id: Uuid,
        finished_at: DateTime<Utc>,
        outcome: TrainingOutcome,
        detail: String,
        resulting_version: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE training_logs SET finished_at = ?, outcome = ?, detail = ?, resulting_version = ?
             WHERE id = ?",
        )
        .bind(finished_at)
        .bind(outcome_tag(outcome))
        .bind(&detail)
        .bind(&resulting_version)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<TrainingLog>, StoreError> {
        let rows = sqlx::query_as::<_, TrainingLogRow>(
            "SELECT id, kind, started_at, finished_at, outcome, detail, resulting_version
             FROM training_logs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrainingLogRow::into_log).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;

    #[tokio::test]
    async fn record_start_then_finish_round_trips() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteTrainingLogStore::new(db.pool().clone());
        let log = TrainingLog {
            id: Uuid::new_v4(),
            kind: ModelVersionKind::Incremental,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            detail: "starting".into(),
            resulting_version: None,
        };
        store.record_start(log.clone()).await.unwrap();

        store
            .record_finish(
                log.id,
                Utc::now(),
                TrainingOutcome::Success,
                "validated, promoted".into(),
                Some("v3.3".into()),
            )
            .await
            .unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].outcome, Some(TrainingOutcome::Success));
        assert_eq!(recent[0].resulting_version.as_deref(), Some("v3.3"));
    }
}
