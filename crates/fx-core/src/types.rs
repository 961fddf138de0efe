use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered currency pair, e.g. `EUR/USD`.
///
/// Stored canonicalized (uppercase, `BASE/QUOTE`) so it can be used as a
/// map/store key without every caller re-normalizing first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair(String);

impl Pair {
    pub fn new(raw: &str) -> Result<Self, PairParseError> {
        let upper = raw.trim().to_uppercase();
        let (base, quote) = upper
            .split_once('/')
            .ok_or_else(|| PairParseError(raw.to_string()))?;
        if base.len() != 3 || quote.len() != 3 || !base.chars().all(|c| c.is_ascii_alphabetic())
            || !quote.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(PairParseError(raw.to_string()));
        }
        Ok(Self(format!("{base}/{quote}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or("")
    }

    /// Smallest conventional price increment for this pair. JPY-quoted pairs
    /// use two decimal places (pip = 0.01); everything else uses four (0.0001).
    pub fn pip_size(&self) -> f64 {
        if self.quote() == "JPY" {
            0.01
        } else {
            0.0001
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid pair: {0}")]
pub struct PairParseError(String);

impl TryFrom<String> for Pair {
    type Error = PairParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pair::new(&value)
    }
}

impl From<Pair> for String {
    fn from(p: Pair) -> Self {
        p.0
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Candle aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
            Timeframe::Week1 => 10080,
        }
    }

    /// Cache TTL for real-time candles of this timeframe: one bar period.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.to_minutes() * 60)
    }
}

/// Trade direction / advisory stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

impl Direction {
    /// `true` if `other` is a directional opposite (long vs short). `Hold`
    /// is never counter to anything.
    pub fn is_counter_to(&self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Direction::Long, Direction::Short) | (Direction::Short, Direction::Long)
        )
    }
}

/// One OHLCV bar. Unique by `(pair, timeframe, ts)`; immutable once the bar
/// has closed (`real_time = false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    pub source: String,
    pub real_time: bool,
    pub expires_at: DateTime<Utc>,
}

/// Explicit, closed breakdown of what drove a prediction. Unknown factor
/// keys from an upstream service are rejected rather than absorbed into a
/// bag, per the closed-sum-type design note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Factors {
    #[serde(default)]
    pub technical: Option<f64>,
    #[serde(default)]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub pattern: Option<f64>,
}

/// The raw output of one predictor call, before it becomes a persisted
/// `Signal`. Kept separate from `Signal` because most predictions never
/// cross the change-detection threshold and are never written down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub signal: Direction,
    pub confidence: f64,
    pub stage1_prob: Option<f64>,
    pub stage2_prob: Option<f64>,
    pub factors: Factors,
    pub model_version: String,
    pub warning: Option<String>,
    pub latency_ms: u64,
}

/// A single advisory emitted by the signal monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalStatus {
    Active,
    Closed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalOutcome {
    Pending,
    Win,
    Loss,
    Breakeven,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub confidence: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub factors: Factors,
    pub model_version: String,
    pub ab_test_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub actual_outcome: SignalOutcome,
    pub actual_pnl: Option<f64>,
}

/// A detected change in a pair/timeframe's latest signal: either a direction
/// flip or a same-direction confidence jump of at least `Δ_c`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalChange {
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub prev_direction: Option<Direction>,
    pub new_direction: Direction,
    pub prev_confidence: Option<f64>,
    pub new_confidence: f64,
    pub strength: f64,
    pub market_condition: String,
    pub detected_at: DateTime<Utc>,
}

/// A user's standing interest in a (pair, timeframe). Unique by
/// `(user_id, pair, timeframe)`; capped at 5 per user (enforced by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub discord_id: Option<String>,
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub channel_id: Option<String>,
}

/// A daily recurring "do not disturb" window, in UTC wall-clock time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MuteWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MuteWindow {
    /// Whether `at` (a UTC time-of-day) falls inside this window. Handles
    /// windows that wrap past midnight (e.g. 22:00-06:00).
    pub fn contains(&self, at: NaiveTime) -> bool {
        if self.start <= self.end {
            at >= self.start && at < self.end
        } else {
            at >= self.start || at < self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPolicy {
    pub user_id: Uuid,
    pub notifications_enabled: bool,
    pub enabled_timeframes: Vec<Timeframe>,
    pub preferred_pairs: Vec<Pair>,
    pub min_confidence: f64,
    pub ml_only: bool,
    pub daily_quota: u32,
    pub cooldown_minutes: i64,
    pub mute_windows: Vec<MuteWindow>,
}

/// Whether a position was opened from an advisory signal or manually.
/// Replaces the source's "NULL signalId means manual" convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionOrigin {
    Manual,
    FromSignal(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionResult {
    Win,
    Loss,
    Breakeven,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    /// Set when this position is the remainder or closed portion of a
    /// partial close; points at the id genealogy's originating position.
    pub parent_id: Option<Uuid>,
    pub user_id: Uuid,
    pub origin: PositionOrigin,
    pub pair: Pair,
    pub direction: Direction,
    pub entry: f64,
    pub opened_at: DateTime<Utc>,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub close_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: PositionStatus,
    pub result: Option<PositionResult>,
    pub pips: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
}

impl Position {
    /// Unrealized price distance in pips, direction-aware (positive = profit).
    pub fn unrealized_pips(&self, current_price: f64) -> f64 {
        let raw = match self.direction {
            Direction::Long => current_price - self.entry,
            Direction::Short => self.entry - current_price,
            Direction::Hold => 0.0,
        };
        raw / self.pair.pip_size()
    }

    /// Unrealized P&L as a percentage of entry price, direction-aware.
    pub fn unrealized_pct(&self, current_price: f64) -> f64 {
        let raw = match self.direction {
            Direction::Long => (current_price - self.entry) / self.entry,
            Direction::Short => (self.entry - current_price) / self.entry,
            Direction::Hold => 0.0,
        };
        raw * 100.0
    }

    /// Fraction of the distance from entry to take-profit that has been
    /// covered by the current price (can be negative or > 1.0).
    pub fn tp_progress(&self, current_price: f64) -> f64 {
        let total = (self.take_profit - self.entry).abs();
        if total <= f64::EPSILON {
            return 0.0;
        }
        let covered = match self.direction {
            Direction::Long => current_price - self.entry,
            Direction::Short => self.entry - current_price,
            Direction::Hold => 0.0,
        };
        covered / total
    }

    /// Whether `candidate` is a strictly better stop-loss than the current
    /// one (closer to the take-profit side; never widens risk).
    pub fn is_better_stop(&self, candidate: f64) -> bool {
        match self.direction {
            Direction::Long => candidate > self.stop_loss,
            Direction::Short => candidate < self.stop_loss,
            Direction::Hold => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Recommendation {
    Hold,
    Exit,
    TakePartial,
    AdjustSl,
}

/// Urgency grade attached to a position-monitor notification. Ordered:
/// L1 is most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationLevel {
    L1Critical = 1,
    L2Important = 2,
    L3General = 3,
    L4Summary = 4,
}

impl NotificationLevel {
    pub fn cooldown(&self) -> chrono::Duration {
        match self {
            NotificationLevel::L1Critical => chrono::Duration::zero(),
            NotificationLevel::L2Important => chrono::Duration::minutes(5),
            NotificationLevel::L3General => chrono::Duration::minutes(30),
            NotificationLevel::L4Summary => chrono::Duration::hours(24),
        }
    }

    /// Whether a mute window suppresses this level (everything except L1).
    pub fn respects_mute_window(&self) -> bool {
        !matches!(self, NotificationLevel::L1Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionMonitoringRecord {
    pub id: Uuid,
    pub position_id: Uuid,
    pub ts: DateTime<Utc>,
    pub current_price: f64,
    pub unrealized_pips: f64,
    pub unrealized_pct: f64,
    pub trend_dir: Direction,
    pub trend_strength: f64,
    pub reversal_prob: f64,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub rationale: String,
    pub notification_sent: bool,
    pub notification_level: Option<NotificationLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModelVersionKind {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub win_rate: f64,
    pub sharpe: f64,
    pub avg_pnl: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub parent: Option<String>,
    pub kind: ModelVersionKind,
    pub trained_at: DateTime<Utc>,
    pub active: bool,
    pub metrics: ModelMetrics,
    pub artifact_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ABTestStatus {
    Running,
    Completed,
    Stopped,
}

/// Realized outcome tally for one side of an A/B test.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ArmStats {
    pub trades: u32,
    pub wins: u32,
}

impl ArmStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTest {
    pub id: Uuid,
    pub a: String,
    pub b: String,
    pub traffic_split: f64,
    pub status: ABTestStatus,
    pub a_stats: ArmStats,
    pub b_stats: ArmStats,
    pub p_value: Option<f64>,
    pub winner: Option<String>,
    pub opened_at: DateTime<Utc>,
}

/// What a notification receipt is in reference to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReceiptSubject {
    Signal(Uuid),
    Position(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub id: Uuid,
    pub subject: ReceiptSubject,
    pub user_id: Uuid,
    pub channel: String,
    pub sent_at: DateTime<Utc>,
    pub level: NotificationLevel,
}

/// One audit row per training cycle the learning controller runs, successful
/// or not. Kept distinct from `ModelVersion` because a failed or
/// non-promoted run never produces one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrainingOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingLog {
    pub id: Uuid,
    pub kind: ModelVersionKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<TrainingOutcome>,
    pub detail: String,
    pub resulting_version: Option<String>,
}
