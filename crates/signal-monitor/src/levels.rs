//! Derives stop-loss/take-profit levels from recent volatility. The
//! predictor emits a direction and confidence, not price levels, so the
//! monitor sizes them itself from the candle window already in hand.

use fx_core::{Candle, Direction};

const ATR_PERIOD: usize = 14;
const STOP_ATR_MULTIPLE: f64 = 1.5;
const TARGET_ATR_MULTIPLE: f64 = 3.0;

/// Average true range over the last `ATR_PERIOD` candles (high-low range
/// approximation; no prior-close gap term since forex gaps are rare enough
/// intraday that it isn't worth the extra state).
pub fn average_true_range(candles: &[Candle]) -> f64 {
    let window = &candles[candles.len().saturating_sub(ATR_PERIOD)..];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|c| c.high - c.low).sum::<f64>() / window.len() as f64
}

/// `(stop_loss, take_profit)` for a fresh signal at `entry`, sized off
/// volatility. `Hold` signals get no meaningful levels (both equal entry).
pub fn derive_levels(direction: Direction, entry: f64, atr: f64) -> (f64, f64) {
    let atr = atr.max(f64::EPSILON);
    match direction {
        Direction::Long => (entry - atr * STOP_ATR_MULTIPLE, entry + atr * TARGET_ATR_MULTIPLE),
        Direction::Short => (entry + atr * STOP_ATR_MULTIPLE, entry - atr * TARGET_ATR_MULTIPLE),
        Direction::Hold => (entry, entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_places_stop_below_and_target_above_entry() {
        let (sl, tp) = derive_levels(Direction::Long, 1.0800, 0.0010);
        assert!(sl < 1.0800);
        assert!(tp > 1.0800);
    }

    #[test]
    fn short_places_stop_above_and_target_below_entry() {
        let (sl, tp) = derive_levels(Direction::Short, 1.0800, 0.0010);
        assert!(sl > 1.0800);
        assert!(tp < 1.0800);
    }
}
