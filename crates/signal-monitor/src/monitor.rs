use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use fx_core::{
    Direction, Pair, Scheduler, Signal, SignalChange, SignalOutcome, SignalStatus, SignalStore,
    SubscriptionStore, Timeframe, WorkerPool,
};
use fx_event_bus::EventBus;
use market_cache::MarketCache;
use predictor_client::{PredictorProvider, VersionRouter, MIN_CANDLES_FOR_PREDICTION};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::change_detector::{ChangeDetector, PriorSignalState};
use crate::levels::{average_true_range, derive_levels};

#[derive(Debug, Clone)]
pub struct SignalMonitorConfig {
    pub tick_interval: Duration,
    pub worker_pool_size: usize,
    pub confidence_delta: f64,
    pub lookback_candles: usize,
}

impl Default for SignalMonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            worker_pool_size: 8,
            confidence_delta: crate::change_detector::DEFAULT_CONFIDENCE_DELTA,
            lookback_candles: 250,
        }
    }
}

/// Drives the per-`(pair, timeframe)` signal check loop. One tick enumerates
/// the current subscription watchlist and dispatches one check task per
/// key, bounded by a worker pool; a key with a check already in flight has
/// its tick dropped rather than queued.
pub struct SignalMonitor {
    cache: Arc<MarketCache>,
    predictor: Arc<dyn PredictorProvider>,
    router: VersionRouter,
    signals: Arc<dyn SignalStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    bus: Arc<EventBus>,
    detector: ChangeDetector,
    config: SignalMonitorConfig,
    in_flight: Arc<DashMap<(Pair, Timeframe), ()>>,
    workers: WorkerPool,
}

impl SignalMonitor {
    pub fn new(
        cache: Arc<MarketCache>,
        predictor: Arc<dyn PredictorProvider>,
        router: VersionRouter,
        signals: Arc<dyn SignalStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        bus: Arc<EventBus>,
        config: SignalMonitorConfig,
    ) -> Self {
        let workers = WorkerPool::new(config.worker_pool_size);
        Self {
            cache,
            predictor,
            router,
            signals,
            subscriptions,
            bus,
            detector: ChangeDetector::new(config.confidence_delta),
            config,
            in_flight: Arc::new(DashMap::new()),
            workers,
        }
    }

    /// Runs until `shutdown` is cancelled. Each tick fans out; the tick
    /// itself returns as soon as work is dispatched, so the driver's own
    /// cadence is never slowed by a slow predictor response.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let scheduler = Scheduler::new(self.config.tick_interval, shutdown);
        scheduler
            .run(|| {
                let this = self.clone();
                async move { this.tick().await }
            })
            .await;
    }

    async fn tick(self: &Arc<Self>) {
        let watchlist = match self.subscriptions.list_watched_pairs().await {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(%err, "failed to load signal watchlist");
                return;
            }
        };

        for (pair, timeframe) in watchlist {
            let key = (pair.clone(), timeframe);
            if self.in_flight.insert(key.clone(), ()).is_some() {
                tracing::debug!(pair = %pair, ?timeframe, "check already in flight, dropping tick");
                continue;
            }

            let this = self.clone();
            tokio::spawn(async move {
                this.workers
                    .run(|| {
                        let this = this.clone();
                        let pair = key.0.clone();
                        async move { this.check_one(&pair, key.1).await }
                    })
                    .await;
                this.in_flight.remove(&key);
            });
        }
    }

    async fn check_one(&self, pair: &Pair, timeframe: Timeframe) {
        let cached = match self
            .cache
            .get_latest(pair, timeframe, self.config.lookback_candles)
            .await
        {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!(%err, pair = %pair, ?timeframe, "candle fetch failed");
                return;
            }
        };

        if cached.candles.len() < MIN_CANDLES_FOR_PREDICTION {
            tracing::debug!(pair = %pair, ?timeframe, count = cached.candles.len(), "insufficient candles for prediction");
            return;
        }

        let routing = self.router.resolve(pair, timeframe, Utc::now()).await;
        let prediction = match self
            .predictor
            .predict(pair, timeframe, &cached.candles, Some(&routing.version_hint))
            .await
        {
            Ok(pred) => pred,
            Err(err) => {
                tracing::debug!(%err, pair = %pair, ?timeframe, "predictor unavailable, skipping tick");
                return;
            }
        };

        let last = match self.signals.get_latest(pair, timeframe).await {
            Ok(last) => last,
            Err(err) => {
                tracing::warn!(%err, pair = %pair, ?timeframe, "failed to load last signal");
                return;
            }
        };
        let prior = last.as_ref().map(PriorSignalState::from_signal);

        if !self.detector.is_change(prior, &prediction) {
            return;
        }

        let market_condition = if prediction.signal == Direction::Hold {
            "ranging"
        } else {
            "trending"
        }
        .to_string();

        let entry = cached.candles.last().map(|c| c.close).unwrap_or(0.0);
        let atr = average_true_range(&cached.candles);
        let (stop_loss, take_profit) = derive_levels(prediction.signal, entry, atr);

        let signal = Signal {
            id: Uuid::new_v4(),
            pair: pair.clone(),
            timeframe,
            direction: prediction.signal,
            confidence: prediction.confidence,
            entry,
            stop_loss,
            take_profit,
            factors: prediction.factors.clone(),
            model_version: prediction.model_version.clone(),
            ab_test_id: routing.ab_test_id,
            created_at: Utc::now(),
            status: SignalStatus::Active,
            actual_outcome: SignalOutcome::Pending,
            actual_pnl: None,
        };

        if let Err(err) = self.signals.create(signal.clone()).await {
            tracing::warn!(%err, pair = %pair, ?timeframe, "failed to persist signal");
            return;
        }

        let change = SignalChange {
            pair: pair.clone(),
            timeframe,
            prev_direction: prior.map(|p| p.direction),
            new_direction: prediction.signal,
            prev_confidence: prior.map(|p| p.confidence),
            new_confidence: prediction.confidence,
            strength: self.detector.strength(prior, &prediction),
            market_condition,
            detected_at: Utc::now(),
        };

        self.bus.publish_signal_changed(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use fx_core::{Candle, CandleStore, Factors, Prediction, StoreError};
    use market_cache::MarketDataFetcher;
    use predictor_client::PredictorError;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct FakeCandleStore {
        rows: AsyncMutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleStore for FakeCandleStore {
        async fn upsert(&self, candles: Vec<Candle>) -> Result<(), StoreError> {
            self.rows.lock().await.extend(candles);
            Ok(())
        }
        async fn get_latest(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
        ) -> Result<Option<Candle>, StoreError> {
            Ok(self.rows.lock().await.last().cloned())
        }
        async fn get_range(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>, StoreError> {
            Ok(self.rows.lock().await.clone())
        }
        async fn expire_stale(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct NoopFetcher;

    #[async_trait]
    impl MarketDataFetcher for NoopFetcher {
        async fn fetch(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>, StoreError> {
            Ok(vec![])
        }
    }

    struct FakePredictor {
        direction: Direction,
        confidence: f64,
    }

    #[async_trait]
    impl PredictorProvider for FakePredictor {
        async fn predict(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
            _candles: &[Candle],
            _version_hint: Option<&str>,
        ) -> Result<Prediction, PredictorError> {
            Ok(Prediction {
                signal: self.direction,
                confidence: self.confidence,
                stage1_prob: None,
                stage2_prob: None,
                factors: Factors::default(),
                model_version: "v1".into(),
                warning: None,
                latency_ms: 5,
            })
        }
        async fn healthcheck(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeSignalStore {
        created: StdMutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalStore for FakeSignalStore {
        async fn create(&self, signal: Signal) -> Result<Signal, StoreError> {
            self.created.lock().unwrap().push(signal.clone());
            Ok(signal)
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Signal>, StoreError> {
            Ok(None)
        }
        async fn get_latest(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
        ) -> Result<Option<Signal>, StoreError> {
            Ok(self.created.lock().unwrap().last().cloned())
        }
        async fn mark_closed(&self, _id: Uuid) -> Result<(), StoreError> {
            Ok(())
        }
        async fn record_outcome(
            &self,
            _id: Uuid,
            _outcome: SignalOutcome,
            _pnl: Option<f64>,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct FixedWatchlist(Vec<(Pair, Timeframe)>);

    #[async_trait]
    impl SubscriptionStore for FixedWatchlist {
        async fn create(
            &self,
            subscription: fx_core::Subscription,
        ) -> Result<fx_core::Subscription, StoreError> {
            Ok(subscription)
        }
        async fn delete(&self, _user_id: Uuid, _pair: &Pair, _tf: Timeframe) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list_for_user(&self, _user_id: Uuid) -> Result<Vec<fx_core::Subscription>, StoreError> {
            Ok(vec![])
        }
        async fn list_subscribers(
            &self,
            _pair: &Pair,
            _tf: Timeframe,
        ) -> Result<Vec<fx_core::Subscription>, StoreError> {
            Ok(vec![])
        }
        async fn list_watched_pairs(&self) -> Result<Vec<(Pair, Timeframe)>, StoreError> {
            Ok(self.0.clone())
        }
    }

    fn candle(pair: &Pair, ts_secs: i64) -> Candle {
        let ts = DateTime::<Utc>::from_timestamp(ts_secs, 0).unwrap();
        Candle {
            pair: pair.clone(),
            timeframe: Timeframe::Hour1,
            ts,
            open: 1.08,
            high: 1.081,
            low: 1.079,
            close: 1.0805,
            volume: None,
            source: "test".into(),
            real_time: false,
            expires_at: ts + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn cold_subscription_produces_first_signal_and_publishes_change() {
        let pair = Pair::new("EUR/USD").unwrap();
        let candle_store = Arc::new(FakeCandleStore::default());
        let cache = Arc::new(MarketCache::new(candle_store.clone(), Arc::new(NoopFetcher)));
        cache
            .upsert((0..120).map(|i| candle(&pair, i * 3600)).collect())
            .await
            .unwrap();

        let predictor = Arc::new(FakePredictor {
            direction: Direction::Long,
            confidence: 0.72,
        });
        let signals = Arc::new(FakeSignalStore::default());
        let subscriptions = Arc::new(FixedWatchlist(vec![(pair.clone(), Timeframe::Hour1)]));
        let bus = Arc::new(EventBus::new(16));
        let mut change_rx = bus.subscribe_signal_changed();

        let router = VersionRouter::new(fx_core::ModelRoutingTable::new(
            fx_core::RoutingState::single("v1"),
        ));
        let monitor = Arc::new(SignalMonitor::new(
            cache,
            predictor,
            router,
            signals.clone(),
            subscriptions,
            bus,
            SignalMonitorConfig::default(),
        ));

        monitor.tick().await;
        // tick() only dispatches; give the spawned check task a turn to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(signals.created.lock().unwrap().len(), 1);
        let change = change_rx.try_recv().expect("expected a published signal.changed event");
        assert_eq!(change.prev_direction, None);
        assert_eq!(change.new_direction, Direction::Long);
    }
}
