use async_trait::async_trait;
use fx_core::{Candle, Pair, Prediction, Timeframe};

use crate::error::PredictorResult;

/// Interface the signal monitor and position monitor depend on, rather than
/// a concrete HTTP type — what makes the predictor trivially fakeable in
/// tests and swappable for a different transport later.
#[async_trait]
pub trait PredictorProvider: Send + Sync {
    /// Requires `candles.len() >= 60`, ascending `ts`, no gap greater than
    /// twice the timeframe; violations return `InvalidInput`.
    async fn predict(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        candles: &[Candle],
        version_hint: Option<&str>,
    ) -> PredictorResult<Prediction>;

    /// Pure liveness probe, split out from `predict` so a health sweep never
    /// risks being mistaken for a real (empty-input) prediction.
    async fn healthcheck(&self) -> bool;
}
