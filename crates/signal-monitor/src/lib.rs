//! Signal Monitor
//!
//! Periodically re-predicts each subscribed `(pair, timeframe)` and detects
//! meaningful changes in the model's advisory: direction flips, or
//! same-direction confidence jumps past a threshold.

pub mod change_detector;
pub mod levels;
pub mod monitor;

pub use change_detector::{ChangeDetector, PriorSignalState, DEFAULT_CONFIDENCE_DELTA};
pub use monitor::{SignalMonitor, SignalMonitorConfig};
