use std::sync::Arc;

use chrono::{Duration, Utc};
use fx_core::{
    ABTest, ABTestStatus, ABTestStore, ArmStats, ModelRoutingTable, ModelVersion, ModelVersionKind,
    ModelVersionStore, TrainingLog, TrainingLogStore, TrainingOutcome,
};
use fx_event_bus::{EventBus, ModelPromotedEvent};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cron::CronSchedule;
use crate::stats;
use crate::trainer::{ModelTrainer, TrainingWindow};
use crate::version;

#[derive(Debug, Clone)]
pub struct LearningControllerConfig {
    pub daily_train_cron: String,
    pub weekly_train_cron: String,
    pub incremental_window: Duration,
    pub incremental_validation_window: Duration,
    pub full_train_window: Duration,
    pub ab_test_duration: Duration,
    pub ab_test_split: f64,
    pub promotion_epsilon: f64,
}

impl Default for LearningControllerConfig {
    fn default() -> Self {
        Self {
            daily_train_cron: "0 2 * * *".to_string(),
            weekly_train_cron: "0 1 * * 0".to_string(),
            incremental_window: Duration::hours(24),
            incremental_validation_window: Duration::days(7),
            full_train_window: Duration::days(90),
            ab_test_duration: Duration::days(7),
            ab_test_split: 0.5,
            promotion_epsilon: 0.02,
        }
    }
}

/// Orchestrates C6: the daily incremental fine-tune, the weekly full
/// retrain, and resolution of whatever A/B test the weekly cycle opened.
/// Never trains a model itself — `trainer` is the black-box external
/// service; this type owns versioning, A/B bookkeeping, and the atomic
/// promotion of the routing table (§4.6, §5).
pub struct LearningController {
    model_versions: Arc<dyn ModelVersionStore>,
    ab_tests: Arc<dyn ABTestStore>,
    training_logs: Arc<dyn TrainingLogStore>,
    routing: Arc<ModelRoutingTable>,
    trainer: Arc<dyn ModelTrainer>,
    bus: Arc<EventBus>,
    config: LearningControllerConfig,
    /// Resource guard: only one training job runs at a time per node. The
    /// other timer's cycle simply skips this firing rather than queuing
    /// behind it — waiting could drift both timers away from their
    /// configured wall-clock times.
    training_lock: Arc<Mutex<()>>,
    daily_schedule: CronSchedule,
    weekly_schedule: CronSchedule,
}

impl LearningController {
    /// Parses `config`'s two cron expressions up front so a malformed
    /// `dailyTrainCron`/`weeklyTrainCron` fails at startup rather than on
    /// the first scheduled firing.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_versions: Arc<dyn ModelVersionStore>,
        ab_tests: Arc<dyn ABTestStore>,
        training_logs: Arc<dyn TrainingLogStore>,
        routing: Arc<ModelRoutingTable>,
        trainer: Arc<dyn ModelTrainer>,
        bus: Arc<EventBus>,
        config: LearningControllerConfig,
    ) -> anyhow::Result<Self> {
        let daily_schedule = CronSchedule::parse(&config.daily_train_cron)
            .map_err(|e| anyhow::anyhow!("invalid dailyTrainCron: {e}"))?;
        let weekly_schedule = CronSchedule::parse(&config.weekly_train_cron)
            .map_err(|e| anyhow::anyhow!("invalid weeklyTrainCron: {e}"))?;

        Ok(Self {
            model_versions,
            ab_tests,
            training_logs,
            routing,
            trainer,
            bus,
            config,
            training_lock: Arc::new(Mutex::new(())),
            daily_schedule,
            weekly_schedule,
        })
    }

    /// Runs both timers until `shutdown` fires. Each is an independent
    /// cron-style loop (§"Design Notes" — unified `Scheduler` abstraction,
    /// no ad-hoc `setInterval`), so a long-running full retrain never
    /// delays the next day's incremental-train firing or vice versa.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let daily_schedule = self.daily_schedule;
        let weekly_schedule = self.weekly_schedule;

        let daily = self.clone();
        let daily_shutdown = shutdown.clone();
        let daily_task = tokio::spawn(async move {
            while await_next_fire(&daily_schedule, &daily_shutdown).await {
                daily.run_daily_cycle().await;
            }
            tracing::info!("learning controller daily timer shutting down");
        });

        let weekly = self.clone();
        let weekly_task = tokio::spawn(async move {
            while await_next_fire(&weekly_schedule, &shutdown).await {
                weekly.run_weekly_cycle().await;
            }
            tracing::info!("learning controller weekly timer shutting down");
        });

        let _ = tokio::join!(daily_task, weekly_task);
    }

    async fn run_daily_cycle(&self) {
        self.maybe_resolve_ab_test().await;

        let Ok(_guard) = self.training_lock.try_lock() else {
            tracing::info!("skipping daily incremental train: a training job is already running");
            return;
        };

        if let Err(err) = self.run_incremental_train().await {
            tracing::warn!(%err, "incremental training cycle failed");
        }
    }

    async fn run_weekly_cycle(&self) {
        let Ok(_guard) = self.training_lock.try_lock() else {
            tracing::info!("skipping weekly full train: a training job is already running");
            return;
        };

        if let Err(err) = self.run_full_train().await {
            tracing::warn!(%err, "full training cycle failed");
        }
    }

    async fn run_incremental_train(&self) -> anyhow::Result<()> {
        let Some(active) = self.model_versions.get_active().await? else {
            tracing::warn!("no active model version, skipping incremental train");
            return Ok(());
        };

        let now = Utc::now();
        let log = self
            .training_logs
            .record_start(TrainingLog {
                id: Uuid::new_v4(),
                kind: ModelVersionKind::Incremental,
                started_at: now,
                finished_at: None,
                outcome: None,
                detail: format!("fine-tuning from {}", active.version),
                resulting_version: None,
            })
            .await?;

        let window = TrainingWindow {
            from: now - self.config.incremental_window,
            to: now,
        };
        let validate_since = now - self.config.incremental_validation_window;

        let run = match self
            .trainer
            .incremental_train(&active.version, window, validate_since)
            .await
        {
            Ok(run) => run,
            Err(err) => {
                self.training_logs
                    .record_finish(
                        log.id,
                        Utc::now(),
                        TrainingOutcome::Failure,
                        format!("trainer unavailable: {err}"),
                        None,
                    )
                    .await?;
                return Ok(());
            }
        };

        let existing_children = self
            .model_versions
            .list()
            .await?
            .iter()
            .filter(|v| v.parent.as_deref() == Some(active.version.as_str()))
            .count() as u32;
        let version_label = version::next_incremental_label(&active.version, existing_children)?;

        let child = ModelVersion {
            version: version_label.clone(),
            parent: Some(active.version.clone()),
            kind: ModelVersionKind::Incremental,
            trained_at: Utc::now(),
            active: false,
            metrics: run.metrics,
            artifact_paths: run.artifact_paths,
        };
        self.model_versions.create(child.clone()).await?;

        if run.validation_win_rate >= active.metrics.win_rate + self.config.promotion_epsilon {
            self.model_versions.promote(&version_label).await?;
            self.routing.promote(version_label.clone()).await;
            self.bus.publish_model_promoted(ModelPromotedEvent {
                promoted: child,
                demoted: Some(active.version.clone()),
            });

            self.training_logs
                .record_finish(
                    log.id,
                    Utc::now(),
                    TrainingOutcome::Success,
                    format!("promoted {version_label} over {}", active.version),
                    Some(version_label),
                )
                .await?;
        } else {
            self.training_logs
                .record_finish(
                    log.id,
                    Utc::now(),
                    TrainingOutcome::Success,
                    format!(
                        "retained {version_label} as dormant (validation win rate {:.3} < active {:.3} + epsilon)",
                        run.validation_win_rate, active.metrics.win_rate
                    ),
                    Some(version_label),
                )
                .await?;
        }

        Ok(())
    }

    async fn run_full_train(&self) -> anyhow::Result<()> {
        let Some(active) = self.model_versions.get_active().await? else {
            tracing::warn!("no active model version, skipping full train");
            return Ok(());
        };

        if self.ab_tests.get_active().await?.is_some() {
            tracing::info!("an A/B test is already running, skipping weekly full train");
            return Ok(());
        }

        let now = Utc::now();
        let log = self
            .training_logs
            .record_start(TrainingLog {
                id: Uuid::new_v4(),
                kind: ModelVersionKind::Full,
                started_at: now,
                finished_at: None,
                outcome: None,
                detail: format!("full retrain challenging {}", active.version),
                resulting_version: None,
            })
            .await?;

        let window = TrainingWindow {
            from: now - self.config.full_train_window,
            to: now,
        };

        let run = match self.trainer.full_train(window).await {
            Ok(run) => run,
            Err(err) => {
                self.training_logs
                    .record_finish(
                        log.id,
                        Utc::now(),
                        TrainingOutcome::Failure,
                        format!("trainer unavailable: {err}"),
                        None,
                    )
                    .await?;
                return Ok(());
            }
        };

        let challenger_version = version::bump_minor(&active.version)?;
        let challenger = ModelVersion {
            version: challenger_version.clone(),
            parent: Some(active.version.clone()),
            kind: ModelVersionKind::Full,
            trained_at: Utc::now(),
            active: false,
            metrics: run.metrics,
            artifact_paths: run.artifact_paths,
        };
        self.model_versions.create(challenger).await?;

        let test = ABTest {
            id: Uuid::new_v4(),
            a: active.version.clone(),
            b: challenger_version.clone(),
            traffic_split: self.config.ab_test_split,
            status: ABTestStatus::Running,
            a_stats: ArmStats::default(),
            b_stats: ArmStats::default(),
            p_value: None,
            winner: None,
            opened_at: Utc::now(),
        };
        let created = self.ab_tests.create(test).await?;
        self.routing.start_ab_test(created).await;

        self.training_logs
            .record_finish(
                log.id,
                Utc::now(),
                TrainingOutcome::Success,
                format!("opened A/B test {challenger_version} vs {}", active.version),
                Some(challenger_version),
            )
            .await?;

        Ok(())
    }

    /// Closes the running A/B test once `abTestDurationDays` has elapsed,
    /// promoting the challenger only if it both wins on realized win rate
    /// and clears the significance bar (§4.6, §8 scenario 6).
    async fn maybe_resolve_ab_test(&self) {
        let test = match self.ab_tests.get_active().await {
            Ok(Some(test)) => test,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(%err, "failed to load active A/B test");
                return;
            }
        };

        if Utc::now() < test.opened_at + self.config.ab_test_duration {
            return;
        }

        let p_value = stats::two_proportion_p_value(test.a_stats, test.b_stats);
        let challenger_wins = test.b_stats.win_rate() > test.a_stats.win_rate();
        let significant = p_value.map(|p| p < 0.05).unwrap_or(false);

        if significant && challenger_wins {
            if let Err(err) = self.model_versions.promote(&test.b).await {
                tracing::warn!(%err, test_id = %test.id, "failed to persist A/B challenger promotion");
                return;
            }
            self.routing.promote(test.b.clone()).await;
            if let Err(err) = self.ab_tests.close(test.id, Some(test.b.clone()), p_value).await {
                tracing::warn!(%err, test_id = %test.id, "failed to close promoted A/B test");
            }
            if let Ok(Some(promoted)) = self.model_versions.get(&test.b).await {
                self.bus.publish_model_promoted(ModelPromotedEvent {
                    promoted,
                    demoted: Some(test.a.clone()),
                });
            }
            tracing::info!(challenger = %test.b, incumbent = %test.a, ?p_value, "A/B test resolved: challenger promoted");
        } else {
            self.routing.retain_incumbent().await;
            if let Err(err) = self.ab_tests.close(test.id, Some(test.a.clone()), p_value).await {
                tracing::warn!(%err, test_id = %test.id, "failed to close retained A/B test");
            }
            tracing::info!(incumbent = %test.a, challenger = %test.b, ?p_value, "A/B test resolved: incumbent retained");
        }
    }
}

/// Sleeps until `schedule`'s next fire, or returns `false` immediately if
/// `shutdown` wins the race.
async fn await_next_fire(schedule: &CronSchedule, shutdown: &CancellationToken) -> bool {
    let now = Utc::now();
    let next = schedule.next_after(now);
    let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);

    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(sleep_for) => true,
    }
}
