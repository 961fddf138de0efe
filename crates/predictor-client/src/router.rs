//! Version routing: picks which model version a prediction request should
//! target, per §4.2's routing rule. Reads `fx_core::ModelRoutingTable`
//! rather than the store directly — the table is the fast, in-memory mirror
//! of whatever `learning-controller` last promoted, so a routing decision
//! never costs a database round trip on the hot predict path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use fx_core::{ModelRoutingTable, Pair, RoutingDecision, Timeframe};

/// Bucket width for the A/B hash: the same `(pair, timeframe)` routes to the
/// same arm for this long before the bucket rolls over, so a user doesn't
/// see both arms thrash within a single notification's relevant window.
const HASH_BUCKET_SECS: i64 = 300;

/// Resolves the `(versionHint, abTestId)` pair for one prediction request.
pub struct VersionRouter {
    table: std::sync::Arc<ModelRoutingTable>,
}

impl VersionRouter {
    pub fn new(table: std::sync::Arc<ModelRoutingTable>) -> Self {
        Self { table }
    }

    pub async fn resolve(&self, pair: &Pair, timeframe: Timeframe, now: chrono::DateTime<chrono::Utc>) -> RoutingDecision {
        let state = self.table.current().await;
        let Some(test) = state.running_test else {
            return RoutingDecision {
                version_hint: state.active_version,
                ab_test_id: None,
            };
        };

        let bucket = now.timestamp() / HASH_BUCKET_SECS;
        let fraction = hash_fraction(pair, timeframe, bucket);
        let version_hint = if fraction < test.traffic_split {
            test.a.clone()
        } else {
            test.b.clone()
        };

        RoutingDecision {
            version_hint,
            ab_test_id: Some(test.id),
        }
    }
}

/// Deterministic, uniform-ish fraction in `[0, 1)` for `(pair, timeframe,
/// bucket)`. Not cryptographic — only needs to split traffic evenly and
/// reproducibly within a bucket window.
fn hash_fraction(pair: &Pair, timeframe: Timeframe, bucket: i64) -> f64 {
    let mut hasher = DefaultHasher::new();
    pair.as_str().hash(&mut hasher);
    (timeframe as u8 as i64).hash(&mut hasher);
    bucket.hash(&mut hasher);
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::{ABTestStatus, ArmStats, ModelRoutingTable, RoutingState};
    use uuid::Uuid;

    fn running_test(split: f64) -> fx_core::ABTest {
        fx_core::ABTest {
            id: Uuid::new_v4(),
            a: "v3.2".into(),
            b: "v3.3".into(),
            traffic_split: split,
            status: ABTestStatus::Running,
            a_stats: ArmStats::default(),
            b_stats: ArmStats::default(),
            p_value: None,
            winner: None,
            opened_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_running_test_routes_to_active_version_with_no_ab_test_id() {
        let table = ModelRoutingTable::new(RoutingState::single("v3.2"));
        let router = VersionRouter::new(table);
        let decision = router
            .resolve(&Pair::new("EUR/USD").unwrap(), Timeframe::Hour1, chrono::Utc::now())
            .await;
        assert_eq!(decision.version_hint, "v3.2");
        assert!(decision.ab_test_id.is_none());
    }

    #[tokio::test]
    async fn running_test_routes_to_one_of_the_two_arms_with_ab_test_id_set() {
        let table = ModelRoutingTable::new(RoutingState::single("v3.2"));
        let test = running_test(0.5);
        let test_id = test.id;
        table.start_ab_test(test).await;
        let router = VersionRouter::new(table);
        let decision = router
            .resolve(&Pair::new("EUR/USD").unwrap(), Timeframe::Hour1, chrono::Utc::now())
            .await;
        assert!(decision.version_hint == "v3.2" || decision.version_hint == "v3.3");
        assert_eq!(decision.ab_test_id, Some(test_id));
    }

    #[tokio::test]
    async fn same_key_and_bucket_routes_consistently() {
        let table = ModelRoutingTable::new(RoutingState::single("v3.2"));
        table.start_ab_test(running_test(0.5)).await;
        let router = VersionRouter::new(table);
        let now = chrono::Utc::now();
        let pair = Pair::new("GBP/USD").unwrap();
        let first = router.resolve(&pair, Timeframe::Hour1, now).await;
        let second = router.resolve(&pair, Timeframe::Hour1, now).await;
        assert_eq!(first.version_hint, second.version_hint);
    }
}
