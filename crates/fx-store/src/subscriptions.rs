use async_trait::async_trait;
use fx_core::{Pair, StoreError, Subscription, SubscriptionStore, Timeframe};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{parse_timeframe, timeframe_tag};

/// Enforced here rather than in `fx-core` since the cap is a storage-layer
/// invariant (§3 invariant 5), not a type-level one.
const MAX_SUBSCRIPTIONS_PER_USER: i64 = 5;

pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    user_id: String,
    pair: String,
    timeframe: String,
    discord_id: Option<String>,
    channel_id: Option<String>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription, StoreError> {
        Ok(Subscription {
            user_id: Uuid::parse_str(&self.user_id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            discord_id: self.discord_id,
            pair: Pair::new(&self.pair).map_err(|e| StoreError::Fatal(e.to_string()))?,
            timeframe: parse_timeframe(&self.timeframe)?,
            channel_id: self.channel_id,
        })
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn create(&self, subscription: Subscription) -> Result<Subscription, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = ?")
                .bind(subscription.user_id.to_string())
                .fetch_one(&mut *tx)
                .await?;

        if count >= MAX_SUBSCRIPTIONS_PER_USER {
            return Err(StoreError::Conflict(format!(
                "user {} already holds the maximum of {MAX_SUBSCRIPTIONS_PER_USER} subscriptions",
                subscription.user_id
            )));
        }

        let insert = sqlx::query(
            "INSERT INTO subscriptions (user_id, pair, timeframe, discord_id, channel_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(subscription.user_id.to_string())
        .bind(subscription.pair.as_str())
        .bind(timeframe_tag(subscription.timeframe))
        .bind(&subscription.discord_id)
        .bind(&subscription.channel_id)
        .execute(&mut *tx)
        .await;

        // The table keys on (user_id, pair, timeframe) via a composite
        // PRIMARY KEY rather than a separate UNIQUE index, so SQLite reports
        // a duplicate as a primary-key violation — a different extended
        // error code than `is_unique_violation()` checks for. Map both
        // explicitly rather than letting the blanket `StoreError::from`
        // conversion mis-classify this as `Fatal`.
        if let Err(sqlx::Error::Database(ref db_err)) = insert {
            if db_err.is_unique_violation() || db_err.message().contains("constraint failed") {
                return Err(StoreError::Conflict(format!(
                    "user {} is already subscribed to {} {:?}",
                    subscription.user_id, subscription.pair, subscription.timeframe
                )));
            }
        }
        insert?;

        tx.commit().await?;
        Ok(subscription)
    }

    async fn delete(
        &self,
        user_id: Uuid,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND pair = ? AND timeframe = ?")
            .bind(user_id.to_string())
            .bind(pair.as_str())
            .bind(timeframe_tag(timeframe))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT user_id, pair, timeframe, discord_id, channel_id FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SubscriptionRow::into_subscription).collect()
    }

    async fn list_subscribers(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT user_id, pair, timeframe, discord_id, channel_id FROM subscriptions
             WHERE pair = ? AND timeframe = ?",
        )
        .bind(pair.as_str())
        .bind(timeframe_tag(timeframe))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SubscriptionRow::into_subscription).collect()
    }

    async fn list_watched_pairs(&self) -> Result<Vec<(Pair, Timeframe)>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT DISTINCT pair, timeframe FROM subscriptions")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(pair, tf)| {
                Ok((
                    Pair::new(&pair).map_err(|e| StoreError::Fatal(e.to_string()))?,
                    parse_timeframe(&tf)?,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;

    fn sub(user_id: Uuid, pair: &Pair, tf: Timeframe) -> Subscription {
        Subscription {
            user_id,
            discord_id: None,
            pair: pair.clone(),
            timeframe: tf,
            channel_id: None,
        }
    }

    #[tokio::test]
    async fn sixth_subscription_is_rejected() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteSubscriptionStore::new(db.pool().clone());
        let user_id = Uuid::new_v4();
        let pairs = ["EUR/USD", "GBP/USD", "USD/JPY", "AUD/USD", "USD/CHF", "NZD/USD"];

        for (i, p) in pairs.iter().enumerate() {
            let pair = Pair::new(p).unwrap();
            let result = store.create(sub(user_id, &pair, Timeframe::Hour1)).await;
            if i < 5 {
                assert!(result.is_ok(), "subscription {i} should succeed");
            } else {
                assert!(matches!(result, Err(StoreError::Conflict(_))));
            }
        }
    }

    #[tokio::test]
    async fn duplicate_subscription_maps_to_conflict() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteSubscriptionStore::new(db.pool().clone());
        let user_id = Uuid::new_v4();
        let pair = Pair::new("EUR/USD").unwrap();

        store.create(sub(user_id, &pair, Timeframe::Hour1)).await.unwrap();
        let result = store.create(sub(user_id, &pair, Timeframe::Hour1)).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn list_watched_pairs_is_distinct_across_users() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteSubscriptionStore::new(db.pool().clone());
        let pair = Pair::new("EUR/USD").unwrap();
        store.create(sub(Uuid::new_v4(), &pair, Timeframe::Hour1)).await.unwrap();
        store.create(sub(Uuid::new_v4(), &pair, Timeframe::Hour1)).await.unwrap();

        let watched = store.list_watched_pairs().await.unwrap();
        assert_eq!(watched.len(), 1);
    }
}
