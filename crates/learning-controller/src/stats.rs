//! Two-proportion significance test for comparing an A/B test's realized
//! win rates. Free functions over primitive inputs, no hidden state — the
//! same shape as `backtest-engine::statistical`'s `sharpe_p_value`, which
//! reaches for `statrs` rather than hand-rolling the normal CDF.

use fx_core::ArmStats;
use statrs::distribution::{ContinuousCDF, Normal};

/// Two-tailed p-value for the null hypothesis that arms `a` and `b` have
/// equal win rates, using the pooled-proportion z-test. Returns `None` when
/// either arm has no trades yet — there is nothing to compare.
pub fn two_proportion_p_value(a: ArmStats, b: ArmStats) -> Option<f64> {
    let n1 = a.trades as f64;
    let n2 = b.trades as f64;
    if n1 == 0.0 || n2 == 0.0 {
        return None;
    }

    let p1 = a.win_rate();
    let p2 = b.win_rate();
    let pooled = (a.wins as f64 + b.wins as f64) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se <= 1e-12 {
        // Both arms agree exactly (often both 0% or both 100%) — no
        // detectable difference, so the null hypothesis stands.
        return Some(1.0);
    }

    let z = (p1 - p2) / se;
    let normal = Normal::new(0.0, 1.0).expect("standard normal is always constructible");
    Some(2.0 * (1.0 - normal.cdf(z.abs())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_arms_are_not_significant() {
        let a = ArmStats { trades: 200, wins: 110 };
        let b = ArmStats { trades: 200, wins: 110 };
        let p = two_proportion_p_value(a, b).unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn large_gap_with_enough_trades_is_significant() {
        let a = ArmStats { trades: 500, wins: 150 };
        let b = ArmStats { trades: 500, wins: 300 };
        let p = two_proportion_p_value(a, b).unwrap();
        assert!(p < 0.001, "expected a tiny p-value, got {p}");
    }

    #[test]
    fn the_spec_example_does_not_clear_the_promotion_threshold() {
        // §8 scenario 6: v3.3 62% (n=200) vs v3.2 55% (n=200) — the pooled
        // z-test puts this well above 0.05, matching the "no promotion"
        // expectation regardless of the scenario's approximate "p ≈ 0.07".
        let a = ArmStats { trades: 200, wins: 110 };
        let b = ArmStats { trades: 200, wins: 124 };
        let p = two_proportion_p_value(a, b).unwrap();
        assert!(p >= 0.05, "expected no significant difference, got p={p}");
    }

    #[test]
    fn an_arm_with_no_trades_yet_cannot_be_compared() {
        let a = ArmStats { trades: 0, wins: 0 };
        let b = ArmStats { trades: 50, wins: 30 };
        assert!(two_proportion_p_value(a, b).is_none());
    }
}
