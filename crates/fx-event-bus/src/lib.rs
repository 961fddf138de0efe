//! Typed in-process event bus.
//!
//! Replaces the source's callback-style Discord/DB handlers with explicit
//! message passing: each topic is a `tokio::sync::broadcast` channel with
//! exactly one producer. Per-`(pair, timeframe)` ordering is preserved
//! because the signal monitor's in-flight guard guarantees a single
//! producing task per key; across keys no ordering is promised.

use tokio::sync::broadcast;

use fx_core::{ModelVersion, PositionMonitoringRecord, SignalChange};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ModelPromotedEvent {
    pub promoted: ModelVersion,
    pub demoted: Option<String>,
}

pub struct EventBus {
    signal_changed: broadcast::Sender<SignalChange>,
    position_evaluated: broadcast::Sender<PositionMonitoringRecord>,
    model_promoted: broadcast::Sender<ModelPromotedEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            signal_changed: broadcast::channel(capacity).0,
            position_evaluated: broadcast::channel(capacity).0,
            model_promoted: broadcast::channel(capacity).0,
        }
    }

    /// Publishing with no subscribers is not an error — events are
    /// best-effort fan-out, not a durable log.
    pub fn publish_signal_changed(&self, event: SignalChange) {
        if self.signal_changed.send(event).is_err() {
            tracing::debug!("signal.changed published with no subscribers");
        }
    }

    pub fn subscribe_signal_changed(&self) -> broadcast::Receiver<SignalChange> {
        self.signal_changed.subscribe()
    }

    pub fn publish_position_evaluated(&self, event: PositionMonitoringRecord) {
        if self.position_evaluated.send(event).is_err() {
            tracing::debug!("position.evaluated published with no subscribers");
        }
    }

    pub fn subscribe_position_evaluated(&self) -> broadcast::Receiver<PositionMonitoringRecord> {
        self.position_evaluated.subscribe()
    }

    pub fn publish_model_promoted(&self, event: ModelPromotedEvent) {
        if self.model_promoted.send(event).is_err() {
            tracing::debug!("model.promoted published with no subscribers");
        }
    }

    pub fn subscribe_model_promoted(&self) -> broadcast::Receiver<ModelPromotedEvent> {
        self.model_promoted.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::{Direction, Pair, Timeframe};

    fn change(pair: &Pair) -> SignalChange {
        SignalChange {
            pair: pair.clone(),
            timeframe: Timeframe::Hour1,
            prev_direction: None,
            new_direction: Direction::Long,
            prev_confidence: None,
            new_confidence: 0.7,
            strength: 0.7,
            market_condition: "trending".into(),
            detected_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_signal_changed();
        let pair = Pair::new("EUR/USD").unwrap();
        bus.publish_signal_changed(change(&pair));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.pair, pair);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        let pair = Pair::new("GBP/USD").unwrap();
        bus.publish_signal_changed(change(&pair));
    }
}
