//! SQLite-backed implementations of every `fx-core` store trait, one file
//! per entity, following `invest-iq-data`'s per-entity module split.
//!
//! Enum and id columns are stored as plain `TEXT`; each module owns its own
//! narrow string mapping rather than leaning on a derive, since sqlx has no
//! first-class enum support for SQLite. Composite/nested fields (factors,
//! mute windows, artifact paths) are stored as JSON text columns, the same
//! way the teacher's `BacktestDb` stores `equity_curve_json`.

pub mod ab_tests;
pub mod candles;
pub mod db;
pub mod model_versions;
pub mod notifications;
pub mod positions;
pub mod signals;
pub mod subscriptions;
pub mod training_logs;
pub mod user_policies;

pub use ab_tests::SqliteABTestStore;
pub use candles::SqliteCandleStore;
pub use db::FxDb;
pub use model_versions::SqliteModelVersionStore;
pub use notifications::SqliteNotificationStore;
pub use positions::SqlitePositionStore;
pub use signals::SqliteSignalStore;
pub use subscriptions::SqliteSubscriptionStore;
pub use training_logs::SqliteTrainingLogStore;
pub use user_policies::SqliteUserPolicyStore;

use fx_core::{Direction, StoreError, Timeframe};

pub(crate) fn timeframe_tag(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::Minute1 => "1m",
        Timeframe::Minute5 => "5m",
        Timeframe::Minute15 => "15m",
        Timeframe::Minute30 => "30m",
        Timeframe::Hour1 => "1h",
        Timeframe::Hour4 => "4h",
        Timeframe::Day1 => "1d",
        Timeframe::Week1 => "1w",
    }
}

pub(crate) fn parse_timeframe(raw: &str) -> Result<Timeframe, StoreError> {
    match raw {
        "1m" => Ok(Timeframe::Minute1),
        "5m" => Ok(Timeframe::Minute5),
        "15m" => Ok(Timeframe::Minute15),
        "30m" => Ok(Timeframe::Minute30),
        "1h" => Ok(Timeframe::Hour1),
        "4h" => Ok(Timeframe::Hour4),
        "1d" => Ok(Timeframe::Day1),
        "1w" => Ok(Timeframe::Week1),
        other => Err(StoreError::Fatal(format!("unknown timeframe tag: {other}"))),
    }
}

pub(crate) fn direction_tag(dir: Direction) -> &'static str {
    match dir {
        Direction::Long => "long",
        Direction::Short => "short",
        Direction::Hold => "hold",
    }
}

pub(crate) fn parse_direction(raw: &str) -> Result<Direction, StoreError> {
    match raw {
        "long" => Ok(Direction::Long),
        "short" => Ok(Direction::Short),
        "hold" => Ok(Direction::Hold),
        other => Err(StoreError::Fatal(format!("unknown direction tag: {other}"))),
    }
}
