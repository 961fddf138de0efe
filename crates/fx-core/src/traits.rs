use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    ABTest, ArmStats, Candle, ModelVersion, NotificationLevel, NotificationReceipt, Pair, Position,
    PositionMonitoringRecord, PositionResult, PositionStatus, ReceiptSubject, Signal,
    SignalOutcome, Subscription, Timeframe, TrainingLog, TrainingOutcome, UserPolicy,
};

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert or overwrite. Callers must preserve ascending `ts` ordering
    /// within a (pair, timeframe); the store does not re-sort.
    async fn upsert(&self, candles: Vec<Candle>) -> Result<(), StoreError>;

    async fn get_latest(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Candle>, StoreError>;

    async fn get_range(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Drop real-time candles whose `expires_at` has passed. Returns the
    /// number of rows removed.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create(&self, signal: Signal) -> Result<Signal, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Signal>, StoreError>;

    async fn get_latest(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Signal>, StoreError>;

    async fn mark_closed(&self, id: Uuid) -> Result<(), StoreError>;

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: SignalOutcome,
        pnl: Option<f64>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Rejects with `StoreError::Conflict` once the user already holds the
    /// maximum number of subscriptions.
    async fn create(&self, subscription: Subscription) -> Result<Subscription, StoreError>;

    async fn delete(
        &self,
        user_id: Uuid,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<(), StoreError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Subscription>, StoreError>;

    /// Everyone subscribed to this (pair, timeframe) — the fan-out list for
    /// a signal change.
    async fn list_subscribers(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Distinct `(pair, timeframe)` pairs with at least one subscriber —
    /// the watchlist the signal monitor's tick driver enumerates.
    async fn list_watched_pairs(&self) -> Result<Vec<(Pair, Timeframe)>, StoreError>;
}

#[async_trait]
pub trait UserPolicyStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPolicy>, StoreError>;

    async fn upsert(&self, policy: UserPolicy) -> Result<UserPolicy, StoreError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn create(&self, position: Position) -> Result<Position, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Position>, StoreError>;

    async fn list_open(&self) -> Result<Vec<Position>, StoreError>;

    async fn list_open_for_user(&self, user_id: Uuid) -> Result<Vec<Position>, StoreError>;

    async fn update_stop_loss(&self, id: Uuid, stop_loss: f64) -> Result<(), StoreError>;

    /// Manual take-profit adjustment (the SL half of "adjust (SL/TP)" is
    /// `update_stop_loss`; trailing-stop auto-adjustment never touches TP).
    async fn update_take_profit(&self, id: Uuid, take_profit: f64) -> Result<(), StoreError>;

    /// Shrinks a position's `size` in place. The only caller is a partial
    /// close: the original row becomes the closed portion at the closed
    /// quantity, and a new row (§ `Position.parent_id`) carries the
    /// remainder.
    async fn update_size(&self, id: Uuid, size: f64) -> Result<(), StoreError>;

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
    ) -> Result<(), StoreError>;

    async fn record_monitoring(
        &self,
        record: PositionMonitoringRecord,
    ) -> Result<PositionMonitoringRecord, StoreError>;

    async fn last_monitoring(
        &self,
        position_id: Uuid,
    ) -> Result<Option<PositionMonitoringRecord>, StoreError>;
}

#[async_trait]
pub trait ModelVersionStore: Send + Sync {
    async fn create(&self, version: ModelVersion) -> Result<ModelVersion, StoreError>;

    async fn get(&self, version: &str) -> Result<Option<ModelVersion>, StoreError>;

    async fn get_active(&self) -> Result<Option<ModelVersion>, StoreError>;

    /// Atomically flips `active` off the current model version and onto
    /// `version`. The router's `RwLock` is what makes this visible
    /// immediately in-process; this persists the decision.
    async fn promote(&self, version: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<ModelVersion>, StoreError>;
}

#[async_trait]
pub trait ABTestStore: Send + Sync {
    async fn create(&self, test: ABTest) -> Result<ABTest, StoreError>;

    async fn get_active(&self) -> Result<Option<ABTest>, StoreError>;

    async fn record_outcome(
        &self,
        id: Uuid,
        arm: ABTestArm,
        won: bool,
    ) -> Result<ArmStats, StoreError>;

    async fn close(
        &self,
        id: Uuid,
        winner: Option<String>,
        p_value: Option<f64>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ABTestArm {
    A,
    B,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn record_receipt(
        &self,
        receipt: NotificationReceipt,
    ) -> Result<NotificationReceipt, StoreError>;

    async fn last_sent(
        &self,
        user_id: Uuid,
        subject: ReceiptSubject,
        level: NotificationLevel,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Most recent receipt for this user/pair/timeframe regardless of which
    /// signal or position it was about: backs both the cooldown check
    /// (timestamp only) and the 30-minute dedup window (timestamp +
    /// direction, since dedup additionally needs "same direction").
    async fn last_sent_for_pair(
        &self,
        user_id: Uuid,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<(crate::types::Direction, DateTime<Utc>)>, StoreError>;

    /// Count of receipts sent to this user since `since` (for the daily
    /// quota check).
    async fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u32, StoreError>;
}

#[async_trait]
pub trait TrainingLogStore: Send + Sync {
    async fn record_start(&self, log: TrainingLog) -> Result<TrainingLog, StoreError>;

    async fn record_finish(
        &self,
        id: Uuid,
        finished_at: DateTime<Utc>,
        outcome: TrainingOutcome,
        detail: String,
        resulting_version: Option<String>,
    ) -> Result<(), StoreError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<TrainingLog>, StoreError>;
}

/// Per-key async mutex over a shared keyspace. Used wherever concurrent
/// tasks must serialize on the same logical resource without blocking
/// unrelated keys: coalescing duplicate upstream fetches for the same
/// (pair, timeframe), guarding against overlapping in-flight checks for the
/// same signal key, and serializing monitoring passes over the same
/// position.
///
/// Entries are never removed; the keyspace (pairs x timeframes, or open
/// position ids) is small and bounded in practice.
pub struct KeyedLock<K: Eq + std::hash::Hash + Clone> {
    locks: dashmap::DashMap<K, std::sync::Arc<tokio::sync::Mutex<()>>>,
}

impl<K: Eq + std::hash::Hash + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + std::hash::Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            locks: dashmap::DashMap::new(),
        }
    }

    fn entry(&self, key: K) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    /// Acquire the lock for `key`, run `f`, and release it. Concurrent
    /// callers on a different key never block on this one.
    pub async fn with_lock<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.entry(key);
        let _guard = lock.lock().await;
        f().await
    }

    /// Try to acquire without waiting; used by callers that want "skip this
    /// round rather than queue" semantics (e.g. the in-flight check guard).
    pub fn try_with_lock<T>(&self, key: K, f: impl FnOnce() -> T) -> Option<T> {
        let lock = self.entry(key);
        match lock.try_lock() {
            Ok(_guard) => Some(f()),
            Err(_) => None,
        }
    }
}
