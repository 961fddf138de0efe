//! Interface to the external model-training service. The ML internals are a
//! black box (§1 scope); this crate's job is orchestration — pulling a time
//! window, handing it off, versioning and A/B-bookkeeping the result — never
//! gradient descent, mirroring how `predictor-client::PredictorProvider`
//! keeps C2's transport swappable and fakeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::ModelMetrics;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct TrainingWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// The artifact and evaluation output of one training run.
#[derive(Debug, Clone)]
pub struct TrainRun {
    pub artifact_paths: Vec<String>,
    pub metrics: ModelMetrics,
    /// The out-of-sample metric the promotion decision compares against the
    /// active model's metric, plus `promotionEpsilon` (§4.6). For
    /// `IncrementalTrain` this is the prior-7-days validation win rate; for
    /// `FullTrain` it is the backtest win rate feeding the A/B test, not a
    /// standalone promotion decision.
    pub validation_win_rate: f64,
}

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("other error: {0}")]
    Other(String),
}

pub type TrainerResult<T> = Result<T, TrainerError>;

/// The external training collaborator. Both calls are long-running by
/// nature (minutes to hours); the controller does not impose its own
/// client-side timeout here the way C2/C4 do on short RPCs — a hung
/// training job simply does not finish before the next cycle fires, and
/// the resource guard (`only one training job at a time`) keeps that from
/// compounding.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn incremental_train(
        &self,
        parent_version: &str,
        window: TrainingWindow,
        validate_since: DateTime<Utc>,
    ) -> TrainerResult<TrainRun>;

    async fn full_train(&self, window: TrainingWindow) -> TrainerResult<TrainRun>;
}
