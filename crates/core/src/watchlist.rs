//! Intraday watchlist: today's one-minute series per symbol, reduced to a change-since-open quote.

use crate::domain::PriceSeries;
use crate::ingest::{IntradayWindow, MarketDataFetcher};
use crate::ingest::provider::normalize_ticker;
use crate::time::normalize;
use chrono_tz::Tz;
use serde::Serialize;

pub const UNAVAILABLE: &str = "data not available";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistQuote {
    pub ticker: String,
    pub last_close: f64,
    pub session_open: f64,
    pub absolute_change: f64,
    pub percent_change: f64,
}

/// Per-request store of the latest intraday series for each watched symbol.
///
/// Symbols keep the order they were configured in. `None` marks a symbol whose fetch failed
/// or came back empty.
#[derive(Debug, Clone, Default)]
pub struct WatchlistSession {
    series: Vec<(String, Option<PriceSeries>)>,
}

impl WatchlistSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<&PriceSeries> {
        let ticker = normalize_ticker(ticker);
        self.series
            .iter()
            .find(|(t, _)| *t == ticker)
            .and_then(|(_, s)| s.as_ref())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchlistEntry {
    Available(WatchlistQuote),
    Unavailable { ticker: String, message: String },
}

impl WatchlistEntry {
    pub fn ticker(&self) -> &str {
        match self {
            WatchlistEntry::Available(q) => &q.ticker,
            WatchlistEntry::Unavailable { ticker, .. } => ticker,
        }
    }
}

/// Fetch the current-day series for every symbol and replace the session contents.
///
/// Symbols are fetched one after another in the given order; repeats are fetched once. A failing
/// symbol is logged and stored as `None`; it never aborts the refresh.
pub async fn refresh(
    fetcher: &MarketDataFetcher,
    symbols: &[String],
    session: &mut WatchlistSession,
    source_tz: Tz,
    display_tz: Tz,
) {
    let mut fresh: Vec<(String, Option<PriceSeries>)> = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let ticker = normalize_ticker(symbol);
        if ticker.is_empty() || fresh.iter().any(|(t, _)| *t == ticker) {
            continue;
        }

        let series = match fetcher.fetch_intraday(&ticker, IntradayWindow::CurrentDay).await {
            Ok(series) if series.is_empty() => {
                tracing::info!(ticker = %ticker, "no intraday bars for watchlist symbol");
                None
            }
            Ok(series) => match normalize(&series, source_tz, display_tz) {
                Ok(normalized) => Some(normalized),
                Err(err) => {
                    tracing::warn!(ticker = %ticker, error = %err, "watchlist normalize failed");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(ticker = %ticker, error = %err, "watchlist fetch failed");
                None
            }
        };
        fresh.push((ticker, series));
    }

    session.series = fresh;
}

/// Change since the session open. `None` without a usable open or close.
pub fn quote(series: &PriceSeries) -> Option<WatchlistQuote> {
    let session_open = series.first_open().filter(|o| o.is_finite() && *o != 0.0)?;
    let last_close = series.last_close().filter(|c| c.is_finite())?;
    let absolute_change = last_close - session_open;

    Some(WatchlistQuote {
        ticker: series.ticker.clone(),
        last_close,
        session_open,
        absolute_change,
        percent_change: absolute_change / session_open * 100.0,
    })
}

pub fn entries(session: &WatchlistSession) -> Vec<WatchlistEntry> {
    session
        .series
        .iter()
        .map(|(ticker, series)| match series.as_ref().and_then(quote) {
            Some(q) => WatchlistEntry::Available(q),
            None => WatchlistEntry::Unavailable {
                ticker: ticker.clone(),
                message: UNAVAILABLE.to_string(),
            },
        })
        .collect()
}
