pub mod cache;
pub mod fetcher;
pub mod series;

pub use cache::{CachedCandles, MarketCache};
pub use fetcher::MarketDataFetcher;
pub use series::CandleSeries;
