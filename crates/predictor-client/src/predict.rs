use std::time::{Duration, Instant};

use async_trait::async_trait;
use fx_core::{Candle, Direction, Factors, Pair, Prediction, Timeframe};
use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, PredictorResult};
use crate::provider::PredictorProvider;

/// `candles.len()` below this is treated as insufficient coverage.
pub const MIN_CANDLES_FOR_PREDICTION: usize = 60;

#[derive(Debug, Clone, Serialize)]
struct CandleWire {
    ts: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<f64>,
}

impl From<&Candle> for CandleWire {
    fn from(c: &Candle) -> Self {
        Self {
            ts: c.ts.timestamp(),
            o: c.open,
            h: c.high,
            l: c.low,
            c: c.close,
            v: c.volume,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    pair: String,
    timeframe: String,
    data: Vec<CandleWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FactorsWire {
    technical: Option<f64>,
    sentiment: Option<f64>,
    pattern: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PredictionWire {
    signal: String,
    confidence: f64,
    stage1_prob: Option<f64>,
    stage2_prob: Option<f64>,
    factors: FactorsWire,
    model_version: String,
    warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    success: bool,
    data: Option<PredictionWire>,
    error: Option<String>,
}

fn timeframe_wire(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::Minute1 => "1min",
        Timeframe::Minute5 => "5min",
        Timeframe::Minute15 => "15min",
        Timeframe::Minute30 => "30min",
        Timeframe::Hour1 => "1h",
        Timeframe::Hour4 => "4h",
        Timeframe::Day1 => "1d",
        Timeframe::Week1 => "1w",
    }
}

fn parse_direction(raw: &str) -> PredictorResult<Direction> {
    match raw {
        "long" => Ok(Direction::Long),
        "short" => Ok(Direction::Short),
        "hold" => Ok(Direction::Hold),
        other => Err(PredictorError::InvalidInput(format!(
            "unrecognized signal direction: {other}"
        ))),
    }
}

/// Validates the candle window contract before a call ever leaves the
/// process: `>= 60` candles, strictly ascending `ts`, no gap wider than
/// twice the timeframe.
pub fn validate_candles(timeframe: Timeframe, candles: &[Candle]) -> PredictorResult<()> {
    if candles.len() < MIN_CANDLES_FOR_PREDICTION {
        return Err(PredictorError::InvalidInput(format!(
            "need at least {MIN_CANDLES_FOR_PREDICTION} candles, got {}",
            candles.len()
        )));
    }
    let max_gap = chrono::Duration::minutes(timeframe.to_minutes() * 2);
    for pair in candles.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.ts <= prev.ts {
            return Err(PredictorError::InvalidInput(
                "candles must be strictly ascending by timestamp".into(),
            ));
        }
        if next.ts - prev.ts > max_gap {
            return Err(PredictorError::InvalidInput(format!(
                "gap between {} and {} exceeds 2x timeframe",
                prev.ts, next.ts
            )));
        }
    }
    Ok(())
}

/// HTTP-backed `PredictorProvider`. Wraps one shared `reqwest::Client`
/// (built once by the caller, one connection pool) plus a process-wide
/// concurrency cap.
#[derive(Clone)]
pub struct HttpPredictorClient {
    http: reqwest::Client,
    base_url: String,
    semaphore: std::sync::Arc<tokio::sync::Semaphore>,
    timeout: Duration,
}

impl HttpPredictorClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            semaphore: std::sync::Arc::new(tokio::sync::Semaphore::new(concurrency)),
            timeout,
        }
    }
}

#[async_trait]
impl PredictorProvider for HttpPredictorClient {
    async fn predict(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        candles: &[Candle],
        version_hint: Option<&str>,
    ) -> PredictorResult<Prediction> {
        validate_candles(timeframe, candles)?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PredictorError::Unavailable("predictor semaphore closed".into()))?;

        let request = PredictRequest {
            pair: pair.to_string(),
            timeframe: timeframe_wire(timeframe).to_string(),
            data: candles.iter().map(CandleWire::from).collect(),
            version_hint: version_hint.map(str::to_string),
        };

        let started = Instant::now();
        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .post(format!("{}/predict", self.base_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| PredictorError::Unavailable("predictor call timed out".into()))??;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PredictorError::Unavailable(format!(
                "predictor returned status {status}"
            )));
        }

        let body: PredictResponse = response.json().await?;
        if !body.success {
            return Err(PredictorError::Unavailable(
                body.error.unwrap_or_else(|| "predictor reported failure".into()),
            ));
        }
        let data = body
            .data
            .ok_or_else(|| PredictorError::Unavailable("predictor returned no data".into()))?;

        Ok(Prediction {
            signal: parse_direction(&data.signal)?,
            confidence: data.confidence,
            stage1_prob: data.stage1_prob,
            stage2_prob: data.stage2_prob,
            factors: Factors {
                technical: data.factors.technical,
                sentiment: data.factors.sentiment,
                pattern: data.factors.pattern,
            },
            model_version: data.model_version,
            warning: data.warning,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn healthcheck(&self) -> bool {
        let result = tokio::time::timeout(
            self.timeout,
            self.http.get(format!("{}/health", self.base_url)).send(),
        )
        .await;
        matches!(result, Ok(Ok(resp)) if resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::Pair;

    fn candle(ts_secs: i64) -> Candle {
        let ts = chrono::DateTime::<chrono::Utc>::from_timestamp(ts_secs, 0).unwrap();
        Candle {
            pair: Pair::new("EUR/USD").unwrap(),
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

    #[test]
    fn rejects_fewer_than_minimum_candles() {
        let candles: Vec<Candle> = (0..59).map(|i| candle(i * 3600)).collect();
        assert!(matches!(
            validate_candles(Timeframe::Hour1, &candles),
            Err(PredictorError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_gap_wider_than_twice_timeframe() {
        let mut candles: Vec<Candle> = (0..60).map(|i| candle(i * 3600)).collect();
        candles[59].ts = candles[58].ts + chrono::Duration::hours(3);
        assert!(matches!(
            validate_candles(Timeframe::Hour1, &candles),
            Err(PredictorError::InvalidInput(_))
        ));
    }

    #[test]
    fn accepts_exactly_minimum_contiguous_candles() {
        let candles: Vec<Candle> = (0..60).map(|i| candle(i * 3600)).collect();
        assert!(validate_candles(Timeframe::Hour1, &candles).is_ok());
    }
}
