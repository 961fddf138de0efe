use async_trait::async_trait;
use fx_core::{MuteWindow, Pair, StoreError, Timeframe, UserPolicy, UserPolicyStore};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct SqliteUserPolicyStore {
    pool: SqlitePool,
}

impl SqliteUserPolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserPolicyRow {
    user_id: String,
    notifications_enabled: bool,
    enabled_timeframes_json: String,
    preferred_pairs_json: String,
    min_confidence: f64,
    ml_only: bool,
    daily_quota: i64,
    cooldown_minutes: i64,
    mute_windows_json: String,
}

impl UserPolicyRow {
    fn into_policy(self) -> Result<UserPolicy, StoreError> {
        let fatal = |e: serde_json::Error| StoreError::Fatal(e.to_string());
        Ok(UserPolicy {
            user_id: Uuid::parse_str(&self.user_id).map_err(|e| StoreError::Fatal(e.to_string()))?,
            notifications_enabled: self.notifications_enabled,
            enabled_timeframes: serde_json::from_str::<Vec<Timeframe>>(&self.enabled_timeframes_json)
                .map_err(fatal)?,
            preferred_pairs: serde_json::from_str::<Vec<Pair>>(&self.preferred_pairs_json)
                .map_err(fatal)?,
            min_confidence: self.min_confidence,
            ml_only: self.ml_only,
            daily_quota: self.daily_quota as u32,
            cooldown_minutes: self.cooldown_minutes,
            mute_windows: serde_json::from_str::<Vec<MuteWindow>>(&self.mute_windows_json)
                .map_err(fatal)?,
        })
    }
}

#[async_trait]
impl UserPolicyStore for SqliteUserPolicyStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPolicy>, StoreError> {
        let row = sqlx::query_as::<_, UserPolicyRow>(
            "SELECT user_id, notifications_enabled, enabled_timeframes_json, preferred_pairs_json,
                min_confidence, ml_only, daily_quota, cooldown_minutes, mute_windows_json
             FROM user_policies WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserPolicyRow::into_policy).transpose()
    }

    async fn upsert(&self, policy: UserPolicy) -> Result<UserPolicy, StoreError> {
        let fatal = |e: serde_json::Error| StoreError::Fatal(e.to_string());
        let timeframes_json =
            serde_json::to_string(&policy.enabled_timeframes).map_err(fatal)?;
        let pairs_json = serde_json::to_string(&policy.preferred_pairs).map_err(fatal)?;
        let mute_windows_json = serde_json::to_string(&policy.mute_windows).map_err(fatal)?;

        sqlx::query(
            "INSERT INTO user_policies (user_id, notifications_enabled, enabled_timeframes_json,
                preferred_pairs_json, min_confidence, ml_only, daily_quota, cooldown_minutes,
                mute_windows_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                notifications_enabled = excluded.notifications_enabled,
                enabled_timeframes_json = excluded.enabled_timeframes_json,
                preferred_pairs_json = excluded.preferred_pairs_json,
                min_confidence = excluded.min_confidence,
                ml_only = excluded.ml_only,
                daily_quota = excluded.daily_quota,
                cooldown_minutes = excluded.cooldown_minutes,
                mute_windows_json = excluded.mute_windows_json",
        )
        .bind(policy.user_id.to_string())
        .bind(policy.notifications_enabled)
        .bind(&timeframes_json)
        .bind(&pairs_json)
        .bind(policy.min_confidence)
        .bind(policy.ml_only)
        .bind(policy.daily_quota as i64)
        .bind(policy.cooldown_minutes)
        .bind(&mute_windows_json)
        .execute(&self.pool)
        .await?;

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FxDb;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteUserPolicyStore::new(db.pool().clone());
        let policy = UserPolicy {
            user_id: Uuid::new_v4(),
            notifications_enabled: true,
            enabled_timeframes: vec![Timeframe::Hour1, Timeframe::Hour4],
            preferred_pairs: vec![Pair::new("EUR/USD").unwrap()],
            min_confidence: 0.6,
            ml_only: false,
            daily_quota: 20,
            cooldown_minutes: 15,
            mute_windows: vec![],
        };
        store.upsert(policy.clone()).await.unwrap();

        let fetched = store.get(policy.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.daily_quota, 20);
        assert_eq!(fetched.enabled_timeframes.len(), 2);
    }

    #[tokio::test]
    async fn upsert_twice_overwrites_not_duplicates() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let store = SqliteUserPolicyStore::new(db.pool().clone());
        let mut policy = UserPolicy {
            user_id: Uuid::new_v4(),
            notifications_enabled: true,
            enabled_timeframes: vec![],
            preferred_pairs: vec![],
            min_confidence: 0.5,
            ml_only: false,
            daily_quota: 10,
            cooldown_minutes: 10,
            mute_windows: vec![],
        };
        store.upsert(policy.clone()).await.unwrap();
        policy.daily_quota = 5;
        store.upsert(policy.clone()).await.unwrap();

        let fetched = store.get(policy.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.daily_quota, 5);
    }
}
