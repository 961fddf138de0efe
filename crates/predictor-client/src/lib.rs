pub mod error;
pub mod predict;
pub mod provider;
pub mod router;

pub use error::{PredictorError, PredictorResult};
pub use predict::{HttpPredictorClient, MIN_CANDLES_FOR_PREDICTION};
pub use provider::PredictorProvider;
pub use router::VersionRouter;

use std::time::Duration;

/// Configuration for the predictor service client.
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PREDICTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8100".to_string()),
            timeout: Duration::from_secs(
                std::env::var("PREDICTOR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            concurrency: std::env::var("PREDICTOR_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
        }
    }
}

/// Builds the shared `reqwest::Client` (one connection pool) and returns the
/// `HttpPredictorClient` wrapping it.
pub fn build_client(config: PredictorConfig) -> HttpPredictorClient {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_max_idle_per_host(20)
        .build()
        .expect("failed to build predictor HTTP client");

    HttpPredictorClient::new(http, config.base_url, config.concurrency, config.timeout)
}
