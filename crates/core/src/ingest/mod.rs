pub mod fetcher;
pub mod provider;
pub mod types;
pub mod yahoo;

pub use fetcher::{IntradayWindow, MarketDataFetcher};
pub use provider::{BarRange, BarsRequest, MarketDataProvider};
