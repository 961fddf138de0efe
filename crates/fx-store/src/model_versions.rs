use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{ModelMetrics, ModelVersion, ModelVersionKind, ModelVersionStore, StoreError};
use sqlx::SqlitePool;

pub struct SqliteModelVersionStore {
    pool: SqlitePool,
}

impl SqliteModelVersionStore {
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
        other => Err(StoreError::Fatal(format!("unknown model version kind: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ModelVersionRow {
    version: String,
    parent: Option<String>,
    kind: String,
    trained_at: DateTime<Utc>,
    active: bool,
    win_rate: f64,
    sharpe: f64,
    avg_pnl: f64,
    max_drawdown: f64,
    artifact_paths_json: String,
}

impl ModelVersionRow {
    fn into_version(self) -> Result<ModelVersion, StoreError> {
        Ok(ModelVersion {
            version: self.version,
            parent: self.parent,
            kind: parse_kind(&self.kind)?,
            trained_at: self.trained_at,
            active: self.active,
            metrics: ModelMetrics {
                win_rate: self.win_rate,
                sharpe: self.sharpe,
                avg_pnl: self.avg_pnl,
                max_drawdown: self.max_drawdown,
            },
            artifact_paths: serde_json::from_str(&self.artifact_paths_json)
                .map_err(|e| StoreError::Fatal(e.to_string()))?,
        })
    }
}

#[async_trait]
impl ModelVersionStore for SqliteModelVersionStore {
    async fn create(&self, version: ModelVersion) -> Result<ModelVersion, StoreError> {
        let artifact_paths_json = serde_json::to_string(&version.artifact_paths)
            .map_err(|e| StoreError::Fatal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO model_versions (version, parent, kind, trained_at, active, win_rate,
                sharpe, avg_pnl, max_drawdown, artifact_paths_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&version.version)
        .bind(&version.parent)
        .bind(kind_tag(version.kind))
        .bind(version.trained_at)
        .bind(version.active)
        .bind(version.metrics.win_rate)
        .bind(version.metrics.sharpe)
        .bind(version.metrics.avg_pnl)
        .bind(version.metrics.max_drawdown)
        .bind(&artifact_paths_json)
        .execute(&self.pool)
        .await?;

        Ok(version)
    }

    async fn get(&self, version: &str) -> Result<Option<ModelVersion>, StoreError> {
        let row = sqlx::query_as::<_, ModelVersionRow>(
            "SELECT version, parent, kind, trained_at, active, win_rate, sharpe, avg_pnl,
                max_drawdown, artifact_paths_json
             FROM model_versions WHERE version = ?",
        )
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ModelVersionRow::into_version).transpose()
    }

    async fn get_active(&self) -> Result<Option<ModelVersion>, StoreError> {
        let row = sqlx::query_as::<_, ModelVersionRow>(
            "SELECT version, parent, kind, trained_at, active, win_rate, sharpe, avg_pnl,
                max_drawdown, artifact_paths_json
             FROM model_versions WHERE active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(ModelVersionRow::into_version).transpose()
    }

    /// Atomic under a single transaction: every other row's `active` flag is
    /// cleared before `version`'s is set, so a reader querying mid-write
    /// never observes two actives (invariant 1, §3).
    async fn promote(&self, version: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE model_versions SET active = 0 WHERE active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE model_versions SET active = 1 WHERE version = ?")
            .bind(version)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidInput(format!(
                "no such model version: {version}"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ModelVersion>, StoreError> {
        let rows = sqlx::query_as::<_, ModelVersionRow>(
            "SELECT version, parent, kind, trained_at, active, win_rate, sharpe, avg_pnl,
                max_drawdown, artifact_paths_json
             FROM model_versions ORDER BY trained_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ModelVersionRow::into_version).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;

    fn version(v: &str, active: bool) -> ModelVersion {
        ModelVersion {
            version: v.into(),
            parent: None,
            kind: ModelVersionKind::Full,
            trained_at: Utc::now(),
            active,
            metrics: ModelMetrics::default(),
            artifact_paths: vec![format!("s3://models/{v}")],
        }
    }

    #[tokio::test]
    async fn promote_clears_previous_active() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteModelVersionStore::new(db.pool().clone());
        store.create(version("v3.2", true)).await.unwrap();
        store.create(version("v3.3", false)).await.unwrap();

        store.promote("v3.3").await.unwrap();

        let active = store.get_active().await.unwrap().unwrap();
        assert_eq!(active.version, "v3.3");
        let old = store.get("v3.2").await.unwrap().unwrap();
        assert!(!old.active);
    }

    #[tokio::test]
    async fn promote_unknown_version_is_invalid_input() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteModelVersionStore::new(db.pool().clone());
        let result = store.promote("v9.9").await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }
}
