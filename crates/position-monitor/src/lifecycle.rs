//! Pure position-lifecycle logic: building a new position, splitting a
//! close into a closed quantity plus an open remainder, and computing the
//! realized outcome of the closed portion. The async driver
//! (`PositionMonitor::open`/`adjust`/`close` in `monitor.rs`) is the only
//! caller; kept separate so the arithmetic is unit-testable without a store,
//! the same split `rules.rs` uses for the recommendation table.

use chrono::Utc;
use fx_core::{Direction, Pair, Position, PositionOrigin, PositionResult, PositionStatus};
use uuid::Uuid;

/// Close prices within this many pips of breakeven are recorded as
/// `PositionResult::Breakeven` rather than a sign-flip on noise.
const BREAKEVEN_BAND_PIPS: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum PositionLifecycleError {
    #[error("close percentage must be > 0 and <= 100, got {0}")]
    InvalidClosePercentage(f64),
    #[error("position {0} is not open")]
    NotOpen(Uuid),
    #[error("position {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] fx_core::StoreError),
}

/// The realized portion of a close, scoped to `quantity` lots — the closed
/// amount on a partial close, or the full `size` on a full close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizedOutcome {
    pub pips: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub result: PositionResult,
}

pub fn realized_outcome(position: &Position, close_price: f64, quantity: f64) -> RealizedOutcome {
    let pips = position.unrealized_pips(close_price);
    let pnl_pct = position.unrealized_pct(close_price);
    let pnl = (pnl_pct / 100.0) * position.entry * quantity;
    let result = if pips.abs() < BREAKEVEN_BAND_PIPS {
        PositionResult::Breakeven
    } else if pips > 0.0 {
        PositionResult::Win
    } else {
        PositionResult::Loss
    };
    RealizedOutcome { pips, pnl, pnl_pct, result }
}

/// How a close percentage splits a position's size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosePlan {
    pub closed_quantity: f64,
    /// `Some` when this is a partial close and an open remainder survives.
    pub remainder_quantity: Option<f64>,
}

/// Validates `close_percentage` against `position` and works out the
/// closed/remainder split. Does not touch any store.
pub fn plan_close(
    position: &Position,
    close_percentage: f64,
) -> Result<ClosePlan, PositionLifecycleError> {
    if position.status != PositionStatus::Open {
        return Err(PositionLifecycleError::NotOpen(position.id));
    }
    if !(close_percentage > 0.0 && close_percentage <= 100.0) {
        return Err(PositionLifecycleError::InvalidClosePercentage(close_percentage));
    }

    let closed_quantity = position.size * (close_percentage / 100.0);
    let remainder_quantity = if close_percentage < 100.0 {
        Some(position.size - closed_quantity)
    } else {
        None
    };

    Ok(ClosePlan { closed_quantity, remainder_quantity })
}

/// Builds the closed-child row for a partial close: same entry, stops,
/// origin and user as `original`, linked back to it via `parent_id`, at
/// `quantity` lots with the realized outcome baked in.
pub fn closed_child(original: &Position, close_price: f64, closed_at: chrono::DateTime<Utc>, quantity: f64, outcome: &RealizedOutcome) -> Position {
    Position {
        id: Uuid::new_v4(),
        parent_id: Some(original.id),
        user_id: original.user_id,
        origin: original.origin,
        pair: original.pair.clone(),
        direction: original.direction,
        entry: original.entry,
        opened_at: original.opened_at,
        size: quantity,
        stop_loss: original.stop_loss,
        take_profit: original.take_profit,
        close_price: Some(close_price),
        closed_at: Some(closed_at),
        status: PositionStatus::Closed,
        result: Some(outcome.result),
        pips: Some(outcome.pips),
        pnl: Some(outcome.pnl),
        pnl_pct: Some(outcome.pnl_pct),
    }
}

/// Builds the open-remainder row for a partial close: same entry, stops,
/// origin and user as `original`, linked back to it via `parent_id`.
pub fn remainder_position(original: &Position, remainder_quantity: f64) -> Position {
    Position {
        id: Uuid::new_v4(),
        parent_id: Some(original.id),
        user_id: original.user_id,
        origin: original.origin,
        pair: original.pair.clone(),
        direction: original.direction,
        entry: original.entry,
        opened_at: original.opened_at,
        size: remainder_quantity,
        stop_loss: original.stop_loss,
        take_profit: original.take_profit,
        close_price: None,
        closed_at: None,
        status: PositionStatus::Open,
        result: None,
        pips: None,
        pnl: None,
        pnl_pct: None,
    }
}

/// Inputs for opening a new position, either manually or from a signal
/// (`signal_id` set).
pub struct OpenPositionRequest {
    pub user_id: Uuid,
    pub pair: Pair,
    pub direction: Direction,
    pub entry: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub signal_id: Option<Uuid>,
}

pub fn build_new_position(req: OpenPositionRequest, opened_at: chrono::DateTime<Utc>) -> Position {
    Position {
        id: Uuid::new_v4(),
        parent_id: None,
        user_id: req.user_id,
        origin: req
            .signal_id
            .map(PositionOrigin::FromSignal)
            .unwrap_or(PositionOrigin::Manual),
        pair: req.pair,
        direction: req.direction,
        entry: req.entry,
        opened_at,
        size: req.size,
        stop_loss: req.stop_loss,
        take_profit: req.take_profit,
        close_price: None,
        closed_at: None,
        status: PositionStatus::Open,
        result: None,
        pips: None,
        pnl: None,
        pnl_pct: None,
    }
}

/// What a completed close produced. A full close leaves the original row
/// closed in place; a partial close supersedes the original (marked
/// `Cancelled`, its own size/price fields untouched) with two new children
/// carrying `parent_id = original.id`.
#[derive(Debug, Clone)]
pub enum ClosePositionOutcome {
    Full { closed: Position, outcome: RealizedOutcome },
    Partial { closed_child: Position, remainder: Position, outcome: RealizedOutcome },
}
