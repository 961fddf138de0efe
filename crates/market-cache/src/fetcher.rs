use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{Candle, Pair, StoreError, Timeframe};

/// Upstream source of candle history. The cache calls this on a read miss
/// or partial coverage; it never calls it speculatively.
#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    /// Returns candles covering `[from, to]` in ascending `ts` order.
    /// Implementations must preserve that ordering; the cache does not
    /// re-sort what comes back.
    async fn fetch(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError>;
}
