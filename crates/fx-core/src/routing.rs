//! In-memory model routing table.
//!
//! The durable record of "which model is active" lives in `ModelVersionStore`
//! / `ABTestStore`; this is the fast, read-many/write-rare cache of that
//! decision that `predictor-client` consults on every `predict()` call
//! rather than round-tripping to the store per request. A single
//! `RwLock` guards it, and the write side (promotion) never awaits while
//! holding the write guard — the lock only ever wraps plain field
//! mutations, per the concurrency design's "no suspension under a shared
//! lock" rule.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::ABTest;

/// What C2 currently routes prediction requests to.
#[derive(Debug, Clone)]
pub struct RoutingState {
    /// The single `ModelVersion.active = true` version when no A/B test is
    /// running. During a running test this is the incumbent (arm A).
    pub active_version: String,
    /// Set while exactly two versions are routable.
    pub running_test: Option<ABTest>,
}

impl RoutingState {
    pub fn single(active_version: impl Into<String>) -> Self {
        Self {
            active_version: active_version.into(),
            running_test: None,
        }
    }
}

/// A version-routing decision for one prediction request.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub version_hint: String,
    pub ab_test_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct ModelRoutingTable {
    state: RwLock<RoutingState>,
}

impl ModelRoutingTable {
    pub fn new(initial: RoutingState) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(initial),
        })
    }

    pub async fn current(&self) -> RoutingState {
        self.state.read().await.clone()
    }

    /// Atomic promotion: the challenger becomes the sole active version and
    /// any running test is cleared. Invariant 1 (§3) holds on either side
    /// of this call: exactly one active version with no test running, or
    /// exactly two versions routable while `running_test` is `Some`.
    pub async fn promote(&self, new_active_version: impl Into<String>) {
        let mut guard = self.state.write().await;
        guard.active_version = new_active_version.into();
        guard.running_test = None;
    }

    /// Opens an A/B split: the existing active version remains arm A, the
    /// incumbent stays routable, and the challenger becomes arm B until the
    /// test closes (by `promote` or by `retain_incumbent`).
    pub async fn start_ab_test(&self, test: ABTest) {
        let mut guard = self.state.write().await;
        guard.running_test = Some(test);
    }

    /// Closes a test without swapping the active version (incumbent wins,
    /// or the test was stopped early).
    pub async fn retain_incumbent(&self) {
        let mut guard = self.state.write().await;
        guard.running_test = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ABTestStatus, ArmStats};

    fn test_fixture() -> ABTest {
        ABTest {
            id: Uuid::new_v4(),
            a: "v3.2".into(),
            b: "v3.3".into(),
            traffic_split: 0.5,
            status: ABTestStatus::Running,
            a_stats: ArmStats::default(),
            b_stats: ArmStats::default(),
            p_value: None,
            winner: None,
            opened_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn promote_clears_running_test_and_swaps_active() {
        let table = ModelRoutingTable::new(RoutingState::single("v3.2"));
        table.start_ab_test(test_fixture()).await;
        assert!(table.current().await.running_test.is_some());

        table.promote("v3.3").await;
        let state = table.current().await;
        assert_eq!(state.active_version, "v3.3");
        assert!(state.running_test.is_none());
    }

    #[tokio::test]
    async fn retain_incumbent_clears_test_without_changing_active() {
        let table = ModelRoutingTable::new(RoutingState::single("v3.2"));
        table.start_ab_test(test_fixture()).await;
        table.retain_incumbent().await;
        let state = table.current().await;
        assert_eq!(state.active_version, "v3.2");
        assert!(state.running_test.is_none());
    }
}
