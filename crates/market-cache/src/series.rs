use chrono::{DateTime, Utc};
use fx_core::Candle;

/// An ascending-by-`ts` run of candles for one `(pair, timeframe)`. Kept
/// small and simple: this is the lock-free read path, not the source of
/// truth (`fx_core::CandleStore` is).
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self { candles: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Insert-or-replace by `ts`, keeping ascending order. `ts` itself is
    /// never mutated by an update.
    pub fn upsert(&mut self, candle: Candle) {
        match self.candles.binary_search_by_key(&candle.ts, |c| c.ts) {
            Ok(idx) => self.candles[idx] = candle,
            Err(idx) => self.candles.insert(idx, candle),
        }
    }

    pub fn latest(&self, n: usize) -> Vec<Candle> {
        let start = self.candles.len().saturating_sub(n);
        self.candles[start..].to_vec()
    }

    pub fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Candle> {
        self.candles
            .iter()
            .filter(|c| c.ts >= from && c.ts <= to)
            .cloned()
            .collect()
    }

    /// Whether this series already has enough coverage to answer `[from,
    /// to]` without consulting the external fetcher.
    pub fn covers(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        match (self.candles.first(), self.candles.last()) {
            (Some(first), Some(last)) => first.ts <= from && last.ts >= to,
            _ => false,
        }
    }

    /// Whether there are at least `n` candles available.
    pub fn has_at_least(&self, n: usize) -> bool {
        self.candles.len() >= n
    }

    /// Drop expired real-time candles; historical (non-real-time) candles
    /// never expire. Returns the number removed.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> u64 {
        let before = self.candles.len();
        self.candles.retain(|c| !c.real_time || c.expires_at > now);
        (before - self.candles.len()) as u64
    }
}
