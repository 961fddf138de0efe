//! Central settings for the forex advisory backplane, loaded once at
//! process start. Follows the teacher's `AgentConfig::from_env()` shape:
//! every field has an environment variable with a sane default, and only
//! genuinely unguessable secrets fail construction.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Settings {
    // Signal monitor (C3)
    pub tick_interval_signal: Duration,
    pub worker_pool_signal: usize,
    pub confidence_delta_threshold: f64,
    pub min_candles_for_prediction: usize,

    // Position monitor (C5)
    pub tick_interval_position: Duration,
    pub worker_pool_position: usize,
    pub trailing_breakeven_pct: f64,
    pub trailing_lock_pct: f64,
    pub stale_hold_hours: i64,

    // Predictor client (C2)
    pub predictor_timeout: Duration,
    pub predictor_base_url: String,
    pub predictor_concurrency: usize,

    // Delivery engine (C4)
    pub dedup_window: Duration,
    pub default_daily_quota: u32,
    pub default_cooldown_minutes: i64,

    // Learning controller (C6)
    pub daily_train_cron: String,
    pub weekly_train_cron: String,
    pub ab_test_duration_days: i64,
    pub ab_test_split: f64,
    pub promotion_epsilon: f64,
    pub trainer_base_url: String,
    pub trainer_timeout: Duration,

    // Ambient
    pub database_url: String,
    pub log_filter: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tick_interval_signal: Duration::from_secs(env_parse("TICK_INTERVAL_SIGNAL_SECS", 60)?),
            worker_pool_signal: env_parse("WORKER_POOL_SIGNAL", 8)?,
            confidence_delta_threshold: env_parse("CONFIDENCE_DELTA_THRESHOLD", 0.10)?,
            min_candles_for_prediction: env_parse("MIN_CANDLES_FOR_PREDICTION", 60)?,

            tick_interval_position: Duration::from_secs(env_parse(
                "TICK_INTERVAL_POSITION_SECS",
                60,
            )?),
            worker_pool_position: env_parse("WORKER_POOL_POSITION", 10)?,
            trailing_breakeven_pct: env_parse("TRAILING_BREAKEVEN_PCT", 0.5)?,
            trailing_lock_pct: env_parse("TRAILING_LOCK_PCT", 0.8)?,
            stale_hold_hours: env_parse("STALE_HOLD_HOURS", 24)?,

            predictor_timeout: Duration::from_secs(env_parse("PREDICTOR_TIMEOUT_SECS", 30)?),
            predictor_base_url: env::var("PREDICTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8100".to_string()),
            predictor_concurrency: env_parse("PREDICTOR_CONCURRENCY", 16)?,

            dedup_window: Duration::from_secs(env_parse("DEDUP_WINDOW_SECS", 30 * 60)?),
            default_daily_quota: env_parse("DEFAULT_DAILY_QUOTA", 20)?,
            default_cooldown_minutes: env_parse("DEFAULT_COOLDOWN_MINUTES", 15)?,

            daily_train_cron: env::var("DAILY_TRAIN_CRON")
                .unwrap_or_else(|_| "0 2 * * *".to_string()),
            weekly_train_cron: env::var("WEEKLY_TRAIN_CRON")
                .unwrap_or_else(|_| "0 1 * * 0".to_string()),
            ab_test_duration_days: env_parse("AB_TEST_DURATION_DAYS", 7)?,
            ab_test_split: env_parse("AB_TEST_SPLIT", 0.5)?,
            promotion_epsilon: env_parse("PROMOTION_EPSILON", 0.02)?,
            trainer_base_url: env::var("TRAINER_URL")
                .unwrap_or_else(|_| "http://localhost:8200".to_string()),
            trainer_timeout: Duration::from_secs(env_parse("TRAINER_TIMEOUT_SECS", 300)?),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:fx_backplane.db".to_string()),
            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?}: {e}"))
            .with_context(|| format!("invalid value for {key}")),
        Err(_) => Ok(default),
    }
}
