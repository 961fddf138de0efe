//! Change detection for the latest prediction of a (pair, timeframe).
//!
//! A pure function module: given the previous signal state and a fresh
//! prediction, decide whether enough has changed to warrant persisting a
//! new `Signal`/`SignalChange` pair. No I/O, no hidden state.

use fx_core::{Direction, Prediction, Signal};

/// Minimum confidence delta, same-direction, that counts as a change.
pub const DEFAULT_CONFIDENCE_DELTA: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSignalState {
    pub direction: Direction,
    pub confidence: f64,
}

pub struct ChangeDetector {
    confidence_delta: f64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_DELTA)
    }
}

impl ChangeDetector {
    pub fn new(confidence_delta: f64) -> Self {
        Self { confidence_delta }
    }

    /// `true` if this prediction constitutes a change worth persisting:
    /// no prior signal, a direction flip, or a same-direction confidence
    /// jump of at least the configured delta.
    pub fn is_change(&self, prior: Option<PriorSignalState>, pred: &Prediction) -> bool {
        match prior {
            None => true,
            Some(prior) => {
                pred.signal != prior.direction
                    || (pred.confidence - prior.confidence).abs() >= self.confidence_delta
            }
        }
    }

    /// Rough "strength" score for the detected change, used to populate
    /// `SignalChange.strength`: 1.0 for a direction flip, otherwise the
    /// normalized confidence delta capped at 1.0.
    pub fn strength(&self, prior: Option<PriorSignalState>, pred: &Prediction) -> f64 {
        match prior {
            None => pred.confidence,
            Some(prior) if pred.signal != prior.direction => 1.0,
            Some(prior) => ((pred.confidence - prior.confidence).abs() / self.confidence_delta)
                .min(1.0),
        }
    }
}

impl PriorSignalState {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            direction: signal.direction,
            confidence: signal.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::Factors;

    fn prediction(signal: Direction, confidence: f64) -> Prediction {
        Prediction {
            signal,
            confidence,
            stage1_prob: None,
            stage2_prob: None,
            factors: Factors::default(),
            model_version: "v1".into(),
            warning: None,
            latency_ms: 10,
        }
    }

    #[test]
    fn no_prior_signal_is_always_a_change() {
        let detector = ChangeDetector::default();
        assert!(detector.is_change(None, &prediction(Direction::Long, 0.6)));
    }

    #[test]
    fn direction_flip_is_a_change_regardless_of_confidence_delta() {
        let detector = ChangeDetector::default();
        let prior = PriorSignalState {
            direction: Direction::Long,
            confidence: 0.65,
        };
        assert!(detector.is_change(Some(prior), &prediction(Direction::Short, 0.66)));
    }

    #[test]
    fn small_same_direction_confidence_move_is_not_a_change() {
        let detector = ChangeDetector::default();
        let prior = PriorSignalState {
            direction: Direction::Long,
            confidence: 0.60,
        };
        assert!(!detector.is_change(Some(prior), &prediction(Direction::Long, 0.64)));
    }

    #[test]
    fn confidence_delta_exactly_at_threshold_is_a_change() {
        let detector = ChangeDetector::new(0.10);
        let prior = PriorSignalState {
            direction: Direction::Long,
            confidence: 0.60,
        };
        assert!(detector.is_change(Some(prior), &prediction(Direction::Long, 0.70)));
    }
}
