//! HTTP-backed `ModelTrainer`, mirroring `predictor-client::HttpPredictorClient`:
//! one shared `reqwest::Client`, a thin JSON wire shape, and timeouts mapped
//! to `TrainerError::Unavailable` rather than propagated as transport errors.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::ModelMetrics;
use serde::{Deserialize, Serialize};

use crate::trainer::{ModelTrainer, TrainRun, TrainerError, TrainerResult, TrainingWindow};

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Builds the shared `reqwest::Client` (one connection pool) backing
/// `HttpModelTrainer`. Training calls are long-running, so the client
/// itself carries no request timeout — `timeout` only bounds how long a
/// single HTTP round trip may take once the remote responds.
pub fn build_client(config: TrainerConfig) -> HttpModelTrainer {
    let http = reqwest::Client::builder()
        .build()
        .expect("failed to build training HTTP client");
    HttpModelTrainer::new(http, config.base_url, config.timeout)
}

#[derive(Debug, Serialize)]
struct WindowWire {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl From<TrainingWindow> for WindowWire {
    fn from(w: TrainingWindow) -> Self {
        Self { from: w.from, to: w.to }
    }
}

#[derive(Debug, Serialize)]
struct IncrementalTrainRequest {
    parent_version: String,
    window: WindowWire,
    validate_since: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct FullTrainRequest {
    window: WindowWire,
}

#[derive(Debug, Deserialize)]
struct MetricsWire {
    win_rate: f64,
    sharpe: f64,
    avg_pnl: f64,
    max_drawdown: f64,
}

impl From<MetricsWire> for ModelMetrics {
    fn from(m: MetricsWire) -> Self {
        Self {
            win_rate: m.win_rate,
            sharpe: m.sharpe,
            avg_pnl: m.avg_pnl,
            max_drawdown: m.max_drawdown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrainRunWire {
    artifact_paths: Vec<String>,
    metrics: MetricsWire,
    validation_win_rate: f64,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    success: bool,
    data: Option<TrainRunWire>,
    error: Option<String>,
}

impl From<reqwest::Error> for TrainerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            TrainerError::Unavailable(err.to_string())
        } else {
            TrainerError::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TrainerError {
    fn from(err: serde_json::Error) -> Self {
        TrainerError::Other(format!("deserialize failure: {err}"))
    }
}

pub struct HttpModelTrainer {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpModelTrainer {
    pub fn new(http: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self { http, base_url, timeout }
    }

    async fn call(&self, path: &str, body: impl Serialize) -> TrainerResult<TrainRun> {
        let response = tokio::time::timeout(
            self.timeout,
            self.http.post(format!("{}{path}", self.base_url)).json(&body).send(),
        )
        .await
        .map_err(|_| TrainerError::Unavailable("training call timed out".into()))??;

        if !response.status().is_success() {
            return Err(TrainerError::Unavailable(format!(
                "training service returned status {}",
                response.status()
            )));
        }

        let parsed: TrainResponse = response.json().await?;
        if !parsed.success {
            return Err(TrainerError::Unavailable(
                parsed.error.unwrap_or_else(|| "training service reported failure".into()),
            ));
        }
        let data = parsed
            .data
            .ok_or_else(|| TrainerError::Unavailable("training service returned no data".into()))?;

        Ok(TrainRun {
            artifact_paths: data.artifact_paths,
            metrics: data.metrics.into(),
            validation_win_rate: data.validation_win_rate,
        })
    }
}

#[async_trait]
impl ModelTrainer for HttpModelTrainer {
    async fn incremental_train(
        &self,
        parent_version: &str,
        window: TrainingWindow,
        validate_since: DateTime<Utc>,
    ) -> TrainerResult<TrainRun> {
        self.call(
            "/train/incremental",
            IncrementalTrainRequest {
                parent_version: parent_version.to_string(),
                window: window.into(),
                validate_since,
            },
        )
        .await
    }

    async fn full_train(&self, window: TrainingWindow) -> TrainerResult<TrainRun> {
        self.call("/train/full", FullTrainRequest { window: window.into() }).await
    }
}
