//! C5 Position Monitor: the periodic per-open-position re-evaluation loop
//! described in the backplane spec — unrealized P&L, ML-assisted
//! recommendation, trailing-stop adjustment, and urgency-graded
//! notification gating.

pub mod lifecycle;
pub mod monitor;
pub mod rules;

pub use lifecycle::{
    ClosePositionOutcome, OpenPositionRequest, PositionLifecycleError, RealizedOutcome,
};
pub use monitor::{PositionMonitor, PositionMonitorConfig};
