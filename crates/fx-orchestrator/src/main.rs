use std::sync::Arc;

use fx_config::Settings;
use fx_core::ModelRoutingTable;
use fx_event_bus::EventBus;
use fx_store::FxDb;
use learning_controller::{LearningController, LearningControllerConfig};
use market_cache::MarketCache;
use position_monitor::{PositionMonitor, PositionMonitorConfig};
use predictor_client::{PredictorConfig, VersionRouter};
use signal_monitor::{SignalMonitor, SignalMonitorConfig};
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

mod fetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("starting forex advisory backplane");

    let settings = Settings::from_env()?;
    tracing::info!(
        predictor_url = %settings.predictor_base_url,
        trainer_url = %settings.trainer_base_url,
        database_url = %settings.database_url,
        "configuration loaded"
    );

    let db = FxDb::new(&settings.database_url).await?;
    let pool = db.pool().clone();

    let candles = Arc::new(fx_store::SqliteCandleStore::new(pool.clone()));
    let signals = Arc::new(fx_store::SqliteSignalStore::new(pool.clone()));
    let subscriptions = Arc::new(fx_store::SqliteSubscriptionStore::new(pool.clone()));
    let user_policies = Arc::new(fx_store::SqliteUserPolicyStore::new(pool.clone()));
    let positions = Arc::new(fx_store::SqlitePositionStore::new(pool.clone()));
    let model_versions = Arc::new(fx_store::SqliteModelVersionStore::new(pool.clone()));
    let ab_tests = Arc::new(fx_store::SqliteABTestStore::new(pool.clone()));
    let notifications = Arc::new(fx_store::SqliteNotificationStore::new(pool.clone()));
    let training_logs = Arc::new(fx_store::SqliteTrainingLogStore::new(pool.clone()));

    let active_version = model_versions
        .get_active()
        .await?
        .map(|v| v.version)
        .unwrap_or_else(|| "v1.0".to_string());
    let routing = ModelRoutingTable::new(fx_core::RoutingState::single(active_version));
    tracing::info!(active_version = %routing.current().await.active_version, "model routing table initialized");

    let bus = Arc::new(EventBus::default());

    let market_cache = Arc::new(MarketCache::new(candles.clone(), Arc::new(fetcher::PassiveMarketDataFetcher)));

    let predictor = Arc::new(predictor_client::build_client(PredictorConfig {
        base_url: settings.predictor_base_url.clone(),
        timeout: settings.predictor_timeout,
        concurrency: settings.predictor_concurrency,
    }));

    let shutdown = CancellationToken::new();

    let signal_monitor = Arc::new(SignalMonitor::new(
        market_cache.clone(),
        predictor.clone(),
        VersionRouter::new(routing.clone()),
        signals.clone(),
        subscriptions.clone(),
        bus.clone(),
        SignalMonitorConfig {
            tick_interval: settings.tick_interval_signal,
            worker_pool_size: settings.worker_pool_signal,
            confidence_delta: settings.confidence_delta_threshold,
            ..SignalMonitorConfig::default()
        },
    ));

    let position_monitor = Arc::new(PositionMonitor::new(
        positions.clone(),
        signals.clone(),
        ab_tests.clone(),
        user_policies.clone(),
        notifications.clone(),
        market_cache.clone(),
        predictor.clone(),
        VersionRouter::new(routing.clone()),
        bus.clone(),
        PositionMonitorConfig {
            tick_interval: settings.tick_interval_position,
            trailing_breakeven_pct: settings.trailing_breakeven_pct,
            trailing_lock_pct: settings.trailing_lock_pct,
            ..PositionMonitorConfig::default()
        },
    ));

    let delivery_config = delivery_engine::DeliveryConfig::from_env()?;
    let delivery_channels = delivery_engine::build_channels(&delivery_config);
    let delivery_engine = Arc::new(delivery_engine::DeliveryEngine::new(
        subscriptions.clone(),
        user_policies.clone(),
        notifications.clone(),
        signals.clone(),
        delivery_channels,
        delivery_config,
    ));

    let trainer = Arc::new(learning_controller::build_client(learning_controller::TrainerConfig {
        base_url: settings.trainer_base_url.clone(),
        timeout: settings.trainer_timeout,
    }));
    let learning_controller = Arc::new(LearningController::new(
        model_versions,
        ab_tests,
        training_logs,
        routing,
        trainer,
        bus.clone(),
        LearningControllerConfig {
            daily_train_cron: settings.daily_train_cron.clone(),
            weekly_train_cron: settings.weekly_train_cron.clone(),
            ab_test_duration: chrono::Duration::days(settings.ab_test_duration_days),
            ab_test_split: settings.ab_test_split,
            promotion_epsilon: settings.promotion_epsilon,
            ..LearningControllerConfig::default()
        },
    )?);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(signal_monitor.run(shutdown.clone())));
    tasks.push(tokio::spawn(position_monitor.run(shutdown.clone())));
    tasks.push(tokio::spawn(
        delivery_engine.run(bus.subscribe_signal_changed(), shutdown.clone()),
    ));
    tasks.push(tokio::spawn(learning_controller.run(shutdown.clone())));

    tracing::info!("all components running, press Ctrl+C to stop");

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
    for task in tasks {
        if let Err(err) = task.await {
            tracing::warn!(%err, "a component task panicked during shutdown");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
