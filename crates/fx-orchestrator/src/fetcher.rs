use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_core::{Candle, Pair, StoreError, Timeframe};
use market_cache::MarketDataFetcher;

/// Stand-in `MarketDataFetcher` for deployments with no upstream candle
/// source wired in yet: candle history normally arrives through the
/// ingestion endpoint (`MarketCache::upsert`), so a cache miss here is not
/// fatal, only stale — it is reported `Unavailable` and the caller falls
/// back to whatever is already cached. Swap in a real upstream client (a
/// broker feed, a data vendor's REST API) by implementing the same trait;
/// nothing else in the backplane needs to change.
pub struct PassiveMarketDataFetcher;

#[async_trait]
impl MarketDataFetcher for PassiveMarketDataFetcher {
    async fn fetch(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        Err(StoreError::Unavailable(format!(
            "no upstream market-data source configured for {pair} {timeframe:?}"
        )))
    }
}
