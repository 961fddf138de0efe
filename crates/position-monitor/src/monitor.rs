use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use fx_core::{
    ABTestArm, ABTestStore, KeyedLock, NotificationLevel, NotificationStore, Position,
    PositionMonitoringRecord, PositionOrigin, PositionStore, ReceiptSubject, Scheduler,
    SignalOutcome, SignalStore, Timeframe, UserPolicyStore, WorkerPool,
};
use fx_event_bus::EventBus;
use market_cache::MarketCache;
use predictor_client::{PredictorProvider, VersionRouter, MIN_CANDLES_FOR_PREDICTION};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::lifecycle::{self, ClosePositionOutcome, OpenPositionRequest, PositionLifecycleError};
use crate::rules::{self, RecommendationContext};

#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    pub tick_interval: Duration,
    pub batch_size: usize,
    pub inter_batch_spacing: Duration,
    pub lookback_candles: usize,
    pub trailing_breakeven_pct: f64,
    pub trailing_lock_pct: f64,
    /// Timeframe used for candle lookup and prediction when a position was
    /// opened manually rather than from a signal (which carries its own
    /// timeframe). No wire field carries this for manual positions, so a
    /// sensible default stands in — recorded as an open decision in
    /// `DESIGN.md`.
    pub default_timeframe: Timeframe,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            batch_size: 10,
            inter_batch_spacing: Duration::from_secs(1),
            lookback_candles: 250,
            trailing_breakeven_pct: rules::DEFAULT_TRAILING_BREAKEVEN_PCT,
            trailing_lock_pct: rules::DEFAULT_TRAILING_LOCK_PCT,
            default_timeframe: Timeframe::Hour1,
        }
    }
}

/// Drives the per-open-position re-evaluation loop. One tick loads every
/// open position and processes it in fixed-size batches with a fixed
/// inter-batch pause, bounding the RPC rate against the predictor and
/// market cache rather than firing all evaluations at once.
pub struct PositionMonitor {
    positions: Arc<dyn PositionStore>,
    signals: Arc<dyn SignalStore>,
    ab_tests: Arc<dyn ABTestStore>,
    policies: Arc<dyn UserPolicyStore>,
    notifications: Arc<dyn NotificationStore>,
    cache: Arc<MarketCache>,
    predictor: Arc<dyn PredictorProvider>,
    router: VersionRouter,
    bus: Arc<EventBus>,
    config: PositionMonitorConfig,
    in_flight: Arc<DashMap<Uuid, ()>>,
    serialize: KeyedLock<Uuid>,
    workers: WorkerPool,
}

impl PositionMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        positions: Arc<dyn PositionStore>,
        signals: Arc<dyn SignalStore>,
        ab_tests: Arc<dyn ABTestStore>,
        policies: Arc<dyn UserPolicyStore>,
        notifications: Arc<dyn NotificationStore>,
        cache: Arc<MarketCache>,
        predictor: Arc<dyn PredictorProvider>,
        router: VersionRouter,
        bus: Arc<EventBus>,
        config: PositionMonitorConfig,
    ) -> Self {
        let workers = WorkerPool::new(config.batch_size);
        Self {
            positions,
            signals,
            ab_tests,
            policies,
            notifications,
            cache,
            predictor,
            router,
            bus,
            config,
            in_flight: Arc::new(DashMap::new()),
            serialize: KeyedLock::new(),
            workers,
        }
    }

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
        let open = match self.positions.list_open().await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::warn!(%err, "failed to load open positions");
                return;
            }
        };

        let mut batches = open.chunks(self.config.batch_size.max(1)).peekable();
        while let Some(batch) = batches.next() {
            let handles: Vec<_> = batch
                .iter()
                .filter(|p| self.in_flight.insert(p.id, ()).is_none())
                .cloned()
                .map(|position| {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.workers
                            .run(|| {
                                let this = this.clone();
                                let position_id = position.id;
                                async move {
                                    this.evaluate_one(position).await;
                                    this.in_flight.remove(&position_id);
                                }
                            })
                            .await;
                    })
                })
                .collect();

            for handle in handles {
                let _ = handle.await;
            }

            if batches.peek().is_some() {
                tokio::time::sleep(self.config.inter_batch_spacing).await;
            }
        }
    }

    async fn evaluate_one(&self, position: Position) {
        self.serialize
            .with_lock(position.id, || async move { self.evaluate_locked(&position).await })
            .await;
    }

    async fn evaluate_locked(&self, position: &Position) {
        let timeframe = self.timeframe_for(position).await;

        let cached = match self
            .cache
            .get_latest(&position.pair, timeframe, self.config.lookback_candles)
            .await
        {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!(%err, position_id = %position.id, "candle fetch failed, skipping evaluation");
                return;
            }
        };

        let current_price = match cached.candles.last() {
            Some(candle) => candle.close,
            None => {
                tracing::debug!(position_id = %position.id, "no candles available, skipping evaluation");
                return;
            }
        };

        let prediction = if cached.candles.len() >= MIN_CANDLES_FOR_PREDICTION {
            let routing = self.router.resolve(&position.pair, timeframe, Utc::now()).await;
            match self
                .predictor
                .predict(&position.pair, timeframe, &cached.candles, Some(&routing.version_hint))
                .await
            {
                Ok(pred) => Some(pred),
                Err(err) => {
                    tracing::debug!(%err, position_id = %position.id, "predictor unavailable, degrading to trailing-only analysis");
                    None
                }
            }
        } else {
            None
        };

        let trailing_sl = rules::evaluate_trailing_stop(
            position,
            current_price,
            self.config.trailing_breakeven_pct,
            self.config.trailing_lock_pct,
        );

        let unrealized_pct = position.unrealized_pct(current_price);
        let unrealized_pips = position.unrealized_pips(current_price);
        let hold_minutes = (Utc::now() - position.opened_at).num_minutes();

        let ctx = RecommendationContext {
            position,
            unrealized_pct,
            hold_minutes,
            prediction: prediction.as_ref(),
            trailing_fired: trailing_sl.is_some(),
        };
        let outcome = rules::recommend(&ctx);

        if let Some(new_sl) = trailing_sl {
            if let Err(err) = self.positions.update_stop_loss(position.id, new_sl).await {
                tracing::warn!(%err, position_id = %position.id, "failed to persist trailing stop adjustment");
            }
        }

        let trend_changed = prediction
            .as_ref()
            .map(|pred| rules::trend_changed_against(position, pred))
            .unwrap_or(false);
        let level = rules::notification_level(position, current_price, &outcome, trend_changed);

        let notification_sent = match level {
            Some(level) => self.should_notify(position, level).await,
            None => false,
        };

        let record = PositionMonitoringRecord {
            id: Uuid::new_v4(),
            position_id: position.id,
            ts: Utc::now(),
            current_price,
            unrealized_pips,
            unrealized_pct,
            trend_dir: prediction.as_ref().map(|p| p.signal).unwrap_or(position.direction),
            trend_strength: prediction.as_ref().map(|p| p.confidence).unwrap_or(0.0),
            reversal_prob: outcome.reversal_prob,
            recommendation: outcome.recommendation,
            confidence: outcome.confidence,
            rationale: outcome.rationale.clone(),
            notification_sent,
            notification_level: if notification_sent { level } else { None },
        };

        match self.positions.record_monitoring(record.clone()).await {
            Ok(persisted) => self.bus.publish_position_evaluated(persisted),
            Err(err) => tracing::warn!(%err, position_id = %position.id, "failed to persist monitoring record"),
        }
    }

    /// Applies the per-level cooldown and mute-window suppression. Does not
    /// send or persist a receipt itself — that is `delivery-engine`'s job,
    /// triggered off the `position.evaluated` event this tick publishes.
    /// Returns whether this evaluation is allowed to notify.
    async fn should_notify(&self, position: &Position, level: NotificationLevel) -> bool {
        let policy = match self.policies.get(position.user_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(%err, user_id = %position.user_id, "failed to load user policy");
                return false;
            }
        };

        if !policy.notifications_enabled {
            return false;
        }

        if level.respects_mute_window() {
            let now_time = Utc::now().time();
            if policy.mute_windows.iter().any(|w| w.contains(now_time)) {
                return false;
            }
        }

        let last_sent = self
            .notifications
            .last_sent(position.user_id, ReceiptSubject::Position(position.id), level)
            .await;
        match last_sent {
            Ok(Some(last)) => Utc::now() - last >= level.cooldown(),
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(%err, position_id = %position.id, "failed to read notification cooldown state");
                false
            }
        }
    }

    async fn timeframe_for(&self, position: &Position) -> Timeframe {
        if let fx_core::PositionOrigin::FromSignal(signal_id) = position.origin {
            if let Ok(Some(signal)) = self.signals.get(signal_id).await {
                return signal.timeframe;
            }
        }
        self.config.default_timeframe
    }

    /// Opens a new position, manually or from an advisory signal.
    pub async fn open(&self, req: OpenPositionRequest) -> Result<Position, PositionLifecycleError> {
        let position = lifecycle::build_new_position(req, Utc::now());
        Ok(self.positions.create(position).await?)
    }

    /// Manual stop-loss / take-profit adjustment. Either field may be left
    /// `None` to leave it unchanged; at least one should be set.
    pub async fn adjust(
        &self,
        id: Uuid,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Position, PositionLifecycleError> {
        let mut position = self
            .positions
            .get(id)
            .await?
            .ok_or(PositionLifecycleError::NotFound(id))?;
        if position.status != fx_core::PositionStatus::Open {
            return Err(PositionLifecycleError::NotOpen(id));
        }

        if let Some(sl) = stop_loss {
            self.positions.update_stop_loss(id, sl).await?;
            position.stop_loss = sl;
        }
        if let Some(tp) = take_profit {
            self.positions.update_take_profit(id, tp).await?;
            position.take_profit = tp;
        }
        Ok(position)
    }

    /// Closes a position, fully (`close_percentage == 100.0`) or partially.
    /// A partial close supersedes the original row (`Cancelled`) and inserts
    /// a closed child plus an open remainder, both carrying `parent_id`. The
    /// closed portion's realized outcome is then routed back into the
    /// originating signal and, if it ran under an active A/B test, that
    /// test's arm stats.
    pub async fn close(
        &self,
        id: Uuid,
        close_price: f64,
        close_percentage: f64,
    ) -> Result<ClosePositionOutcome, PositionLifecycleError> {
        let position = self
            .positions
            .get(id)
            .await?
            .ok_or(PositionLifecycleError::NotFound(id))?;
        let plan = lifecycle::plan_close(&position, close_percentage)?;
        let now = Utc::now();

        let outcome = match plan.remainder_quantity {
            None => {
                let outcome = lifecycle::realized_outcome(&position, close_price, plan.closed_quantity);
                self.positions
                    .close(
                        id,
                        close_price,
                        now,
                        fx_core::PositionStatus::Closed,
                        Some(outcome.result),
                        Some(outcome.pips),
                        Some(outcome.pnl),
                        Some(outcome.pnl_pct),
                    )
                    .await?;
                let mut closed = position.clone();
                closed.status = fx_core::PositionStatus::Closed;
                closed.close_price = Some(close_price);
                closed.closed_at = Some(now);
                closed.result = Some(outcome.result);
                closed.pips = Some(outcome.pips);
                closed.pnl = Some(outcome.pnl);
                closed.pnl_pct = Some(outcome.pnl_pct);
                ClosePositionOutcome::Full { closed, outcome }
            }
            Some(remainder_quantity) => {
                let outcome = lifecycle::realized_outcome(&position, close_price, plan.closed_quantity);
                self.positions
                    .close(
                        id,
                        close_price,
                        now,
                        fx_core::PositionStatus::Cancelled,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await?;

                let closed_child = lifecycle::closed_child(&position, close_price, now, plan.closed_quantity, &outcome);
                let closed_child = self.positions.create(closed_child).await?;

                let remainder = lifecycle::remainder_position(&position, remainder_quantity);
                let remainder = self.positions.create(remainder).await?;

                ClosePositionOutcome::Partial { closed_child, remainder, outcome }
            }
        };

        let realized = match &outcome {
            ClosePositionOutcome::Full { outcome, .. } => outcome,
            ClosePositionOutcome::Partial { outcome, .. } => outcome,
        };
        self.record_trade_outcome(&position, realized).await;

        Ok(outcome)
    }

    /// Feeds a closed trade's result back to its originating signal and, if
    /// that signal ran under a still-active A/B test, to that test's arm
    /// stats — the only production caller of `ABTestStore::record_outcome`.
    /// Never fails the close itself; every failure degrades to a warning.
    async fn record_trade_outcome(&self, position: &Position, outcome: &lifecycle::RealizedOutcome) {
        let PositionOrigin::FromSignal(signal_id) = position.origin else {
            return;
        };

        let signal = match self.signals.get(signal_id).await {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(%err, position_id = %position.id, "failed to load originating signal for outcome routing");
                return;
            }
        };

        let signal_outcome = match outcome.result {
            fx_core::PositionResult::Win => SignalOutcome::Win,
            fx_core::PositionResult::Loss => SignalOutcome::Loss,
            fx_core::PositionResult::Breakeven => SignalOutcome::Breakeven,
        };
        if let Err(err) = self
            .signals
            .record_outcome(signal.id, signal_outcome, Some(outcome.pnl))
            .await
        {
            tracing::warn!(%err, signal_id = %signal.id, "failed to record signal outcome");
        }

        let Some(ab_test_id) = signal.ab_test_id else {
            return;
        };

        let active = match self.ab_tests.get_active().await {
            Ok(Some(active)) => active,
            Ok(None) => {
                tracing::debug!(%ab_test_id, "no active a/b test, skipping outcome routing");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to load active a/b test for outcome routing");
                return;
            }
        };
        if active.id != ab_test_id {
            tracing::debug!(%ab_test_id, active_id = %active.id, "signal's a/b test is no longer active, skipping outcome routing");
            return;
        }

        let arm = if signal.model_version == active.a {
            ABTestArm::A
        } else if signal.model_version == active.b {
            ABTestArm::B
        } else {
            tracing::warn!(model_version = %signal.model_version, "signal model version matches neither arm of the active a/b test");
            return;
        };

        let won = matches!(outcome.result, fx_core::PositionResult::Win);
        if let Err(err) = self.ab_tests.record_outcome(active.id, arm, won).await {
            tracing::warn!(%err, ab_test_id = %active.id, "failed to record a/b test outcome");
        }
    }
}
