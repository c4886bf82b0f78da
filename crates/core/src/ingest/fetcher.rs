use crate::config::Settings;
use crate::domain::{Granularity, PriceSeries};
use crate::ingest::provider::{normalize_ticker, BarRange, BarsRequest, MarketDataProvider};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntradayWindow {
    Trailing7Days,
    CurrentDay,
}

impl IntradayWindow {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "day" | "today" => Some(IntradayWindow::CurrentDay),
            "7d" | "1wk" | "week" => Some(IntradayWindow::Trailing7Days),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSeries {
    series: PriceSeries,
    start: NaiveDate,
    end: NaiveDate,
    fetched_at: DateTime<Utc>,
}

impl CachedSeries {
    /// A TTL too large to add to `fetched_at` never expires.
    fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.fetched_at
            .checked_add_signed(ttl)
            .map_or(true, |expires_at| now < expires_at)
    }

    fn serves(&self, start: NaiveDate, end: NaiveDate, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.start == start && self.end == end && self.is_fresh(now, ttl)
    }
}

/// Entry point for price data. Daily history is cached per ticker for `ttl`; intraday data is
/// always fetched fresh.
pub struct MarketDataFetcher {
    provider: Arc<dyn MarketDataProvider>,
    ttl: chrono::Duration,
    cache: tokio::sync::Mutex<HashMap<String, CachedSeries>>,
}

impl MarketDataFetcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, ttl: chrono::Duration) -> Self {
        Self {
            provider,
            ttl,
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = crate::ingest::yahoo::YahooChartProvider::from_settings(settings)?;
        Ok(Self::new(Arc::new(provider), settings.history_cache_ttl))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Number of tickers currently held in the history cache.
    pub async fn cached_tickers(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Daily bars for `[start, end)`. Unknown symbols come back as an empty series.
    pub async fn fetch_historical(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        self.fetch_historical_at(ticker, start, end, Utc::now()).await
    }

    pub async fn fetch_historical_at(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<PriceSeries> {
        let key = normalize_ticker(ticker);
        anyhow::ensure!(start <= end, "history start {start} is after end {end}");

        {
            let guard = self.cache.lock().await;
            if let Some(cached) = guard.get(&key) {
                if cached.serves(start, end, now, self.ttl) {
                    tracing::debug!(ticker = %key, fetched_at = %cached.fetched_at, "history cache hit");
                    return Ok(cached.series.clone());
                }
            }
        }

        let request = BarsRequest::new(&key, Granularity::Daily, BarRange::dates(start, end));
        let series = self
            .provider
            .fetch_bars(&request)
            .await
            .with_context(|| format!("historical fetch failed for {key}"))?;

        tracing::info!(
            ticker = %key,
            %start,
            %end,
            bars = series.len(),
            provider = self.provider.provider_name(),
            "fetched daily history"
        );

        let mut guard = self.cache.lock().await;
        let before = guard.len();
        guard.retain(|_, cached| cached.is_fresh(now, self.ttl));
        if guard.len() < before {
            tracing::debug!(evicted = before - guard.len(), "evicted stale history entries");
        }
        guard.insert(
            key,
            CachedSeries {
                series: series.clone(),
                start,
                end,
                fetched_at: now,
            },
        );
        Ok(series)
    }

    /// One-minute bars for the requested window.
    pub async fn fetch_intraday(&self, ticker: &str, window: IntradayWindow) -> Result<PriceSeries> {
        self.fetch_intraday_at(ticker, window, Utc::now()).await
    }

    pub async fn fetch_intraday_at(
        &self,
        ticker: &str,
        window: IntradayWindow,
        now: DateTime<Utc>,
    ) -> Result<PriceSeries> {
        let range = match window {
            IntradayWindow::Trailing7Days => BarRange::Between {
                start: now - chrono::Duration::days(7),
                end: now,
            },
            IntradayWindow::CurrentDay => BarRange::CurrentDay,
        };
        let request = BarsRequest::new(ticker, Granularity::OneMinute, range);
        self.provider
            .fetch_bars(&request)
            .await
            .with_context(|| format!("intraday fetch failed for {}", request.ticker))
    }
}
