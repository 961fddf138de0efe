use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Owns the connection pool shared by every `*Store` implementation in this
/// crate. Schema is applied once at construction, statement-by-statement,
/// the same way the teacher's `PortfolioDb::init_schema` does it.
#[derive(Clone)]
pub struct FxDb {
    pool: SqlitePool,
}

impl FxDb {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_applies_schema() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
        sqlx::query("SELECT 1 FROM candles")
            .execute(db.pool())
            .await
            .unwrap();
    }
}
