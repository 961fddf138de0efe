use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fx_core::{Candle, CandleStore, KeyedLock, Pair, StoreError, Timeframe};

use crate::fetcher::MarketDataFetcher;
use crate::series::CandleSeries;

/// Result of a read that may have had to fall back to a failed upstream
/// fetch: `stale = true` means the caller got whatever was cached, not a
/// freshly verified answer.
#[derive(Debug, Clone)]
pub struct CachedCandles {
    pub candles: Vec<Candle>,
    pub stale: bool,
}

/// Minimum candle count C2 requires per prediction; below this a read is
/// treated as insufficient coverage and triggers a fetch.
const MIN_CANDLES_FOR_PREDICTION: usize = 60;

/// In-process mapping `(pair, timeframe) -> CandleSeries`, backed by a
/// durable `CandleStore` and an external `MarketDataFetcher` for cache
/// misses. The `DashMap` read path is lock-free; writes to a given key are
/// serialized only while an upstream fetch for that same key is in flight.
pub struct MarketCache {
    series: DashMap<(Pair, Timeframe), CandleSeries>,
    store: Arc<dyn CandleStore>,
    fetcher: Arc<dyn MarketDataFetcher>,
    fetch_locks: KeyedLock<(Pair, Timeframe)>,
}

impl MarketCache {
    pub fn new(store: Arc<dyn CandleStore>, fetcher: Arc<dyn MarketDataFetcher>) -> Self {
        Self {
            series: DashMap::new(),
            store,
            fetcher,
            fetch_locks: KeyedLock::new(),
        }
    }

    /// Bulk insert-or-update. Commits to the durable store first (the
    /// store's own transaction makes the batch all-or-nothing), then
    /// mirrors the same candles into the in-memory series.
    pub async fn upsert(&self, candles: Vec<Candle>) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }
        self.store.upsert(candles.clone()).await?;
        for candle in candles {
            let key = (candle.pair.clone(), candle.timeframe);
            self.series.entry(key).or_insert_with(CandleSeries::new).upsert(candle);
        }
        Ok(())
    }

    /// Newest `n` candles, ascending. Asks the fetcher if fewer than `n`
    /// (capped at the prediction minimum) are cached.
    pub async fn get_latest(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        n: usize,
    ) -> Result<CachedCandles, StoreError> {
        let want = n.max(MIN_CANDLES_FOR_PREDICTION);
        if let Some(series) = self.series.get(&(pair.clone(), timeframe)) {
            if series.has_at_least(want.min(n)) && series.len() >= n {
                return Ok(CachedCandles {
                    candles: series.latest(n),
                    stale: false,
                });
            }
        }

        let now = Utc::now();
        let from = now - chrono::Duration::minutes(timeframe.to_minutes() * want as i64);
        self.ensure_range(pair, timeframe, from, now).await;

        let series = self.series.get(&(pair.clone(), timeframe));
        let candles = series.map(|s| s.latest(n)).unwrap_or_default();
        let stale = candles.len() < n.min(MIN_CANDLES_FOR_PREDICTION);
        Ok(CachedCandles { candles, stale })
    }

    /// Inclusive range read. Asks the fetcher if the cached series doesn't
    /// already cover `[from, to]`.
    pub async fn get_range(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CachedCandles, StoreError> {
        let covers = self
            .series
            .get(&(pair.clone(), timeframe))
            .map(|s| s.covers(from, to))
            .unwrap_or(false);

        if !covers {
            self.ensure_range(pair, timeframe, from, to).await;
        }

        let series = self.series.get(&(pair.clone(), timeframe));
        let still_covers = series.as_ref().map(|s| s.covers(from, to)).unwrap_or(false);
        let candles = series.map(|s| s.range(from, to)).unwrap_or_default();
        Ok(CachedCandles {
            candles,
            stale: !still_covers,
        })
    }

    /// Coalesced fetch-and-merge: acquires the per-key latch, re-checks
    /// coverage (another task may have just filled it in), and only then
    /// calls the external fetcher. Fetch failures are swallowed here — the
    /// caller sees it as a stale/short result, never as an error, per the
    /// fail-open cache policy.
    async fn ensure_range(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) {
        let key = (pair.clone(), timeframe);
        let store = self.store.clone();
        let fetcher = self.fetcher.clone();
        let pair = pair.clone();

        self.fetch_locks
            .with_lock(key.clone(), || async move {
                if self
                    .series
                    .get(&key)
                    .map(|s| s.covers(from, to))
                    .unwrap_or(false)
                {
                    return;
                }
                match fetcher.fetch(&pair, timeframe, from, to).await {
                    Ok(fetched) => {
                        if let Err(err) = store.upsert(fetched.clone()).await {
                            tracing::warn!(%err, pair = %pair, "candle store upsert failed after fetch");
                        }
                        let mut entry = self.series.entry(key).or_insert_with(CandleSeries::new);
                        for candle in fetched {
                            entry.upsert(candle);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, pair = %pair, "market data fetch failed, serving cached data");
                    }
                }
            })
            .await;
    }

    /// Sweep expired real-time candles from the in-memory series and the
    /// durable store. Intended to be driven by the orchestrator's
    /// housekeeping timer, not called from the hot read path.
    pub async fn expire_stale(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut removed = 0u64;
        for mut entry in self.series.iter_mut() {
            removed += entry.value_mut().expire_stale(now);
        }
        removed += self.store.expire_stale(now).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fx_core::Timeframe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct FakeStore {
        rows: AsyncMutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleStore for FakeStore {
        async fn upsert(&self, candles: Vec<Candle>) -> Result<(), StoreError> {
            self.rows.lock().await.extend(candles);
            Ok(())
        }

        async fn get_latest(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
        ) -> Result<Option<Candle>, StoreError> {
            Ok(self.rows.lock().await.last().cloned())
        }

        async fn get_range(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Candle>, StoreError> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|c| c.ts >= from && c.ts <= to)
                .cloned()
                .collect())
        }

        async fn expire_stale(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl MarketDataFetcher for CountingFetcher {
        async fn fetch(
            &self,
            _pair: &Pair,
            _timeframe: Timeframe,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candles.clone())
        }
    }

    fn candle(pair: &Pair, ts_secs: i64) -> Candle {
        let ts = DateTime::<Utc>::from_timestamp(ts_secs, 0).unwrap();
        Candle {
            pair: pair.clone(),
            timeframe: Timeframe::Hour1,
            ts,
            open: 1.08,
            high: 1.081,
            low: 1.079,
            close: 1.0805,
            volume: None,
            source: "test".into(),
            real_time: false,
            expires_at: ts + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_latest_serves_from_memory_without_fetching() {
        let pair = Pair::new("EUR/USD").unwrap();
        let candles: Vec<Candle> = (0..70).map(|i| candle(&pair, i * 3600)).collect();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            candles: vec![],
        });
        let cache = MarketCache::new(Arc::new(FakeStore::default()), fetcher.clone());
        cache.upsert(candles).await.unwrap();

        let result = cache.get_latest(&pair, Timeframe::Hour1, 60).await.unwrap();
        assert_eq!(result.candles.len(), 60);
        assert!(!result.stale);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_latest_on_miss_falls_back_to_fetcher() {
        let pair = Pair::new("GBP/USD").unwrap();
        let fetched: Vec<Candle> = (0..65).map(|i| candle(&pair, i * 3600)).collect();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            candles: fetched,
        });
        let cache = MarketCache::new(Arc::new(FakeStore::default()), fetcher.clone());

        let result = cache.get_latest(&pair, Timeframe::Hour1, 60).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.candles.len(), 60);
        assert!(!result.stale);
    }
}
