//! Pure decision logic for one position-monitor evaluation: the
//! recommendation table, the trailing-stop rule, and notification urgency
//! grading. Kept free of any store/predictor dependency, the same split
//! `signal-monitor` uses for `change_detector.rs`/`levels.rs` — easy to unit
//! test exhaustively without standing up fakes.

use fx_core::{Direction, NotificationLevel, Position, Prediction, Recommendation};

/// Fraction of TP distance covered before the breakeven trailing rule fires.
pub const DEFAULT_TRAILING_BREAKEVEN_PCT: f64 = 0.5;
/// Fraction of TP distance covered before the lock-in trailing rule fires.
pub const DEFAULT_TRAILING_LOCK_PCT: f64 = 0.8;

const STALE_HOLD_HOURS: i64 = 24;

/// The predictor's confidence that the market is about to move against the
/// position, derived from `Prediction::signal` rather than carried as a
/// separate wire field: a prediction counter to the position direction
/// "is" the reversal risk, the same notion `Direction::is_counter_to`
/// already captures for signal-monitor's change detection.
pub fn reversal_probability(position: &Position, prediction: &Prediction) -> f64 {
    if prediction.signal.is_counter_to(position.direction) {
        prediction.confidence
    } else {
        0.0
    }
}

/// Whether the current price has already crossed the stop-loss or
/// take-profit level, direction-aware.
pub fn stop_or_target_hit(position: &Position, current_price: f64) -> bool {
    match position.direction {
        Direction::Long => current_price <= position.stop_loss || current_price >= position.take_profit,
        Direction::Short => current_price >= position.stop_loss || current_price <= position.take_profit,
        Direction::Hold => false,
    }
}

/// Evaluates the two trailing-stop thresholds against the current price and
/// returns the new stop-loss if a rule fires and the candidate is strictly
/// better than the current one. Never widens risk, per `Position::is_better_stop`.
pub fn evaluate_trailing_stop(
    position: &Position,
    current_price: f64,
    breakeven_pct: f64,
    lock_pct: f64,
) -> Option<f64> {
    let progress = position.tp_progress(current_price);
    let candidate = if progress >= lock_pct {
        Some(position.entry + 0.5 * (position.take_profit - position.entry))
    } else if progress >= breakeven_pct {
        Some(position.entry)
    } else {
        None
    };
    candidate.filter(|&c| position.is_better_stop(c))
}

/// One tick's worth of decision inputs. `prediction` is `None` when the
/// predictor call failed — the monitor degrades to trailing-rules-only
/// analysis in that case rather than fabricating a recommendation.
pub struct RecommendationContext<'a> {
    pub position: &'a Position,
    pub unrealized_pct: f64,
    pub hold_minutes: i64,
    pub prediction: Option<&'a Prediction>,
    pub trailing_fired: bool,
}

#[derive(Debug, Clone)]
pub struct RecommendationOutcome {
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub rationale: String,
    pub reversal_prob: f64,
}

/// Applies the decision table from top to bottom; the first matching row
/// wins.
pub fn recommend(ctx: &RecommendationContext<'_>) -> RecommendationOutcome {
    let reversal_prob = ctx
        .prediction
        .map(|pred| reversal_probability(ctx.position, pred))
        .unwrap_or(0.0);

    if ctx.prediction.is_some() && reversal_prob >= 0.70 {
        return RecommendationOutcome {
            recommendation: Recommendation::Exit,
            confidence: reversal_prob,
            rationale: "predictor signals high-confidence reversal against position".into(),
            reversal_prob,
        };
    }

    if ctx.prediction.is_some() && ctx.unrealized_pct >= 0.5 && (0.4..0.7).contains(&reversal_prob) {
        return RecommendationOutcome {
            recommendation: Recommendation::TakePartial,
            confidence: reversal_prob,
            rationale: "profit target partially reached with moderate reversal risk".into(),
            reversal_prob,
        };
    }

    if ctx.unrealized_pct >= 0.3 && ctx.trailing_fired {
        let confidence = ctx.prediction.map(|p| p.confidence).unwrap_or(0.5);
        return RecommendationOutcome {
            recommendation: Recommendation::AdjustSl,
            confidence,
            rationale: "trailing stop rule triggered".into(),
            reversal_prob,
        };
    }

    if ctx.hold_minutes > STALE_HOLD_HOURS * 60 && ctx.unrealized_pct.abs() < 0.3 {
        return RecommendationOutcome {
            recommendation: Recommendation::Exit,
            confidence: 0.5,
            rationale: "position stale: held over 24h with negligible movement".into(),
            reversal_prob,
        };
    }

    RecommendationOutcome {
        recommendation: Recommendation::Hold,
        confidence: ctx.prediction.map(|p| p.confidence).unwrap_or(0.0),
        rationale: "no action warranted".into(),
        reversal_prob,
    }
}

/// Whether the predicted direction no longer agrees with the position's own
/// direction — the position-monitor's notion of "trend-change signal",
/// scoped to this one position rather than the pair-wide signal state
/// `signal-monitor` tracks separately.
pub fn trend_changed_against(position: &Position, prediction: &Prediction) -> bool {
    prediction.signal != position.direction
}

/// Grades notification urgency for one evaluation. Returns `None` when
/// nothing in this tick rises above L3 (the periodic-summary L4 level is
/// produced by a separate scheduled digest, not by a single position tick).
pub fn notification_level(
    position: &Position,
    current_price: f64,
    outcome: &RecommendationOutcome,
    trend_changed: bool,
) -> Option<NotificationLevel> {
    if stop_or_target_hit(position, current_price) || outcome.reversal_prob >= 0.70 {
        return Some(NotificationLevel::L1Critical);
    }

    if matches!(
        outcome.recommendation,
        Recommendation::Exit | Recommendation::TakePartial
    ) && outcome.confidence >= 0.70
    {
        return Some(NotificationLevel::L2Important);
    }

    if matches!(outcome.recommendation, Recommendation::AdjustSl)
        || (trend_changed && outcome.confidence >= 0.55)
    {
        return Some(NotificationLevel::L3General);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fx_core::{Factors, Pair, PositionOrigin, PositionStatus};
    use uuid::Uuid;

    fn long_position(entry: f64, sl: f64, tp: f64) -> Position {
        Position {
            id: Uuid::new_v4(),
            parent_id: None,
            user_id: Uuid::new_v4(),
            origin: PositionOrigin::Manual,
            pair: Pair::new("EUR/USD").unwrap(),
            direction: Direction::Long,
            entry,
            opened_at: Utc::now(),
            size: 1.0,
            stop_loss: sl,
            take_profit: tp,
            close_price: None,
            closed_at: None,
            status: PositionStatus::Open,
            result: None,
            pips: None,
            pnl: None,
            pnl_pct: None,
        }
    }

    fn prediction(signal: Direction, confidence: f64) -> Prediction {
        Prediction {
            signal,
            confidence,
            stage1_prob: None,
            stage2_prob: None,
            factors: Factors::default(),
            model_version: "v1".into(),
            warning: None,
            latency_ms: 5,
        }
    }

    #[test]
    fn trailing_breakeven_fires_at_half_tp_progress() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let new_sl = evaluate_trailing_stop(&position, 1.0830, DEFAULT_TRAILING_BREAKEVEN_PCT, DEFAULT_TRAILING_LOCK_PCT);
        assert_eq!(new_sl, Some(1.0800));
    }

    #[test]
    fn trailing_lock_fires_at_eighty_percent_progress_and_beats_breakeven() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        // 80% of 60 pips = 48 pips -> price 1.0848
        let new_sl = evaluate_trailing_stop(&position, 1.0848, DEFAULT_TRAILING_BREAKEVEN_PCT, DEFAULT_TRAILING_LOCK_PCT);
        assert_eq!(new_sl, Some(1.0830));
    }

    #[test]
    fn trailing_rule_never_widens_an_already_better_stop() {
        let mut position = long_position(1.0800, 1.0780, 1.0860);
        position.stop_loss = 1.0810; // already past breakeven
        let new_sl = evaluate_trailing_stop(&position, 1.0830, DEFAULT_TRAILING_BREAKEVEN_PCT, DEFAULT_TRAILING_LOCK_PCT);
        assert_eq!(new_sl, None);
    }

    #[test]
    fn high_confidence_counter_prediction_recommends_exit_at_l1() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let pred = prediction(Direction::Short, 0.80);
        let ctx = RecommendationContext {
            position: &position,
            unrealized_pct: 0.1,
            hold_minutes: 30,
            prediction: Some(&pred),
            trailing_fired: false,
        };
        let outcome = recommend(&ctx);
        assert_eq!(outcome.recommendation, Recommendation::Exit);
        assert_eq!(
            notification_level(&position, 1.0805, &outcome, true),
            Some(NotificationLevel::L1Critical)
        );
    }

    #[test]
    fn moderate_reversal_with_profit_recommends_take_partial() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let pred = prediction(Direction::Short, 0.55);
        let ctx = RecommendationContext {
            position: &position,
            unrealized_pct: 0.6,
            hold_minutes: 120,
            prediction: Some(&pred),
            trailing_fired: false,
        };
        let outcome = recommend(&ctx);
        assert_eq!(outcome.recommendation, Recommendation::TakePartial);
    }

    #[test]
    fn stale_position_with_negligible_movement_recommends_exit() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let ctx = RecommendationContext {
            position: &position,
            unrealized_pct: 0.05,
            hold_minutes: 25 * 60,
            prediction: None,
            trailing_fired: false,
        };
        let outcome = recommend(&ctx);
        assert_eq!(outcome.recommendation, Recommendation::Exit);
        assert_eq!(outcome.rationale, "position stale: held over 24h with negligible movement");
    }

    #[test]
    fn no_predictor_and_no_trailing_rule_holds() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let ctx = RecommendationContext {
            position: &position,
            unrealized_pct: 0.1,
            hold_minutes: 60,
            prediction: None,
            trailing_fired: false,
        };
        let outcome = recommend(&ctx);
        assert_eq!(outcome.recommendation, Recommendation::Hold);
    }

    #[test]
    fn sl_hit_is_always_l1_regardless_of_recommendation() {
        let position = long_position(1.0800, 1.0780, 1.0860);
        let ctx = RecommendationContext {
            position: &position,
            unrealized_pct: -0.2,
            hold_minutes: 60,
            prediction: None,
            trailing_fired: false,
        };
        let outcome = recommend(&ctx);
        assert_eq!(
            notification_level(&position, 1.0780, &outcome, false),
            Some(NotificationLevel::L1Critical)
        );
    }
}
