use crate::domain::{Granularity, PriceSeries};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// Time span a bar request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarRange {
    /// Half-open `[start, end)` in UTC.
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// The exchange's current (or most recent) trading session.
    CurrentDay,
}

impl BarRange {
    /// Whole calendar days `[start, end)` interpreted at UTC midnight.
    pub fn dates(start: NaiveDate, end: NaiveDate) -> Self {
        BarRange::Between {
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarsRequest {
    pub ticker: String,
    pub granularity: Granularity,
    pub range: BarRange,
}

impl BarsRequest {
    pub fn new(ticker: &str, granularity: Granularity, range: BarRange) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            granularity,
            range,
        }
    }
}

/// Free-text symbols are only trimmed and upper-cased; nothing checks them against an
/// exchange list.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Returns an empty series for symbols the provider does not know. `Err` is reserved
    /// for transport, HTTP and decoding failures.
    async fn fetch_bars(&self, request: &BarsRequest) -> Result<PriceSeries>;
}
