//! Pure per-recipient eligibility checks, split out from the store-backed
//! engine the same way `signal-monitor`'s `change_detector.rs` keeps its
//! decision logic free of any store/predictor dependency.

use chrono::{DateTime, Utc};
use fx_core::{NotificationLevel, Pair, Timeframe, UserPolicy};

/// Everything short of cooldown/quota/dedup, which need a store read and so
/// stay on the engine itself.
pub fn policy_allows(policy: &UserPolicy, pair: &Pair, timeframe: Timeframe, confidence: f64) -> bool {
    if !policy.notifications_enabled {
        return false;
    }
    if !policy.enabled_timeframes.is_empty() && !policy.enabled_timeframes.contains(&timeframe) {
        return false;
    }
    if !policy.preferred_pairs.is_empty() && !policy.preferred_pairs.contains(pair) {
        return false;
    }
    if confidence < policy.min_confidence {
        return false;
    }
    true
}

/// `UserPolicy.mlOnly` requires the prediction carry a model version;
/// `Signal::model_version` is a required (non-`Option`) field on the wire,
/// so an empty string is the only way "unset" can occur here.
pub fn ml_only_blocks(policy: &UserPolicy, model_version: &str) -> bool {
    policy.ml_only && model_version.is_empty()
}

pub fn mute_window_blocks(policy: &UserPolicy, now: DateTime<Utc>) -> bool {
    let time = now.time();
    policy.mute_windows.iter().any(|w| w.contains(time))
}

/// Maps a signal's confidence to a notification urgency, reusing the same
/// `NotificationLevel` scale the position monitor grades against rather
/// than inventing a parallel one.
pub fn signal_notification_level(confidence: f64) -> NotificationLevel {
    if confidence >= 0.70 {
        NotificationLevel::L2Important
    } else {
        NotificationLevel::L3General
    }
}
