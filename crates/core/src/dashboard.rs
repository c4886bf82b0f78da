//! Assembles everything the dashboard shows for one ticker into a single report.
//!
//! Panels degrade independently: a missing history blanks every panel, a failed fit blanks only
//! the forecast panels, and the report itself is always produced.

use crate::analytics::{compute_moving_averages, DerivedSeries, DEFAULT_SMA_WINDOWS};
use crate::config::Settings;
use crate::domain::{BarTimestamp, PriceBar, PriceSeries};
use crate::forecast::{self, ForecastError, ForecastHorizon, ForecastRecord, ProfilePoint};
use crate::ingest::provider::normalize_ticker;
use crate::ingest::MarketDataFetcher;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRequest {
    pub ticker: String,
    pub horizon: ForecastHorizon,
}

impl DashboardRequest {
    pub fn new(ticker: &str, years: u32) -> Result<Self, ForecastError> {
        Ok(Self {
            ticker: normalize_ticker(ticker),
            horizon: ForecastHorizon::from_years(years)?,
        })
    }

    pub fn with_defaults(settings: &Settings) -> Self {
        Self {
            ticker: normalize_ticker(&settings.default_ticker),
            horizon: ForecastHorizon::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> Panel<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Panel::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(v) => Some(v),
            Panel::Unavailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp: BarTimestamp,
    pub open: Option<f64>,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumePoint {
    pub timestamp: BarTimestamp,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub ds: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentBreakdown {
    pub trend: Vec<TrendPoint>,
    /// One period of each seasonal component.
    pub seasonal: BTreeMap<String, Vec<ProfilePoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub ticker: String,
    pub horizon_years: u32,
    pub history_bars: usize,
    pub recent: Panel<Vec<PriceBar>>,
    pub price_chart: Panel<Vec<PricePoint>>,
    pub moving_averages: Panel<DerivedSeries>,
    pub volume_chart: Panel<Vec<VolumePoint>>,
    pub forecast_tail: Panel<Vec<ForecastRecord>>,
    pub forecast: Panel<Vec<ForecastRecord>>,
    pub components: Panel<ComponentBreakdown>,
}

impl DashboardReport {
    fn all_unavailable(request: &DashboardRequest, reason: &str) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            ticker: request.ticker.clone(),
            horizon_years: request.horizon.years(),
            history_bars: 0,
            recent: Panel::unavailable(reason),
            price_chart: Panel::unavailable(reason),
            moving_averages: Panel::unavailable(reason),
            volume_chart: Panel::unavailable(reason),
            forecast_tail: Panel::unavailable(reason),
            forecast: Panel::unavailable(reason),
            components: Panel::unavailable(reason),
        }
    }

    pub fn ready_panels(&self) -> usize {
        [
            self.recent.is_ready(),
            self.price_chart.is_ready(),
            self.moving_averages.is_ready(),
            self.volume_chart.is_ready(),
            self.forecast_tail.is_ready(),
            self.forecast.is_ready(),
            self.components.is_ready(),
        ]
        .iter()
        .filter(|r| **r)
        .count()
    }
}

/// Fetch daily history from `settings.history_start` through `today` and build every panel.
pub async fn build_dashboard(
    fetcher: &MarketDataFetcher,
    settings: &Settings,
    request: &DashboardRequest,
    today: NaiveDate,
) -> DashboardReport {
    let history = match fetcher
        .fetch_historical(&request.ticker, settings.history_start, today)
        .await
    {
        Ok(series) => series,
        Err(err) => {
            tracing::warn!(ticker = %request.ticker, error = %err, "history unavailable for dashboard");
            return DashboardReport::all_unavailable(request, &format!("price data unavailable: {err}"));
        }
    };

    if history.is_empty() {
        tracing::info!(ticker = %request.ticker, "no price history for dashboard");
        return DashboardReport::all_unavailable(
            request,
            &format!("no price data for {}", request.ticker),
        );
    }

    assemble(request, &history)
}

fn assemble(request: &DashboardRequest, history: &PriceSeries) -> DashboardReport {
    let mut report = DashboardReport::all_unavailable(request, "");
    report.history_bars = history.len();
    report.recent = Panel::Ready(history.tail(PREVIEW_ROWS).to_vec());
    report.price_chart = Panel::Ready(
        history
            .bars
            .iter()
            .map(|b| PricePoint {
                timestamp: b.timestamp,
                open: b.open,
                close: b.close,
            })
            .collect(),
    );
    report.volume_chart = Panel::Ready(
        history
            .bars
            .iter()
            .map(|b| VolumePoint {
                timestamp: b.timestamp,
                volume: b.volume,
            })
            .collect(),
    );
    report.moving_averages = match compute_moving_averages(history, &DEFAULT_SMA_WINDOWS) {
        Ok(derived) => Panel::Ready(derived),
        Err(err) => Panel::unavailable(err.to_string()),
    };

    match forecast_panels(history, request.horizon) {
        Ok((records, components)) => {
            let tail_start = records.len().saturating_sub(PREVIEW_ROWS);
            report.forecast_tail = Panel::Ready(records[tail_start..].to_vec());
            report.forecast = Panel::Ready(records);
            report.components = Panel::Ready(components);
        }
        Err(err) => {
            tracing::warn!(ticker = %request.ticker, error = %err, "forecast unavailable");
            let reason = err.to_string();
            report.forecast_tail = Panel::unavailable(reason.clone());
            report.forecast = Panel::unavailable(reason.clone());
            report.components = Panel::unavailable(reason);
        }
    }

    tracing::info!(
        ticker = %report.ticker,
        report_id = %report.report_id,
        bars = report.history_bars,
        horizon_years = report.horizon_years,
        ready_panels = report.ready_panels(),
        "dashboard assembled"
    );
    report
}

fn forecast_panels(
    history: &PriceSeries,
    horizon: ForecastHorizon,
) -> Result<(Vec<ForecastRecord>, ComponentBreakdown), ForecastError> {
    let model = forecast::fit(history)?;
    let records = forecast::predict(&model, horizon.days())?;

    let trend = records
        .iter()
        .map(|r| TrendPoint {
            ds: r.ds,
            value: r.trend,
        })
        .collect();
    let mut seasonal = BTreeMap::new();
    for name in model.component_names() {
        if let Some(profile) = model.seasonal_profile(&name)? {
            seasonal.insert(name, profile);
        }
    }

    Ok((records, ComponentBreakdown { trend, seasonal }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetcher::testing::{daily_bars, FakeProvider};
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn fetcher(provider: FakeProvider) -> MarketDataFetcher {
        MarketDataFetcher::new(Arc::new(provider), chrono::Duration::hours(24))
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + 0.2 * i as f64 + (i as f64 / 5.0).sin()).collect()
    }

    #[tokio::test]
    async fn full_report_for_known_ticker() {
        let f = fetcher(FakeProvider::default().with("AAPL", daily_bars(d(2023, 1, 1), &closes(200))));
        let request = DashboardRequest::new("aapl", 1).unwrap();
        let report = build_dashboard(&f, &Settings::default(), &request, d(2023, 7, 20)).await;

        assert_eq!(report.ticker, "AAPL");
        assert_eq!(report.history_bars, 200);
        assert_eq!(report.ready_panels(), 7);
        assert_eq!(report.recent.ready().unwrap().len(), 5);
        assert_eq!(report.forecast.ready().unwrap().len(), 200 + 365);
        assert_eq!(report.forecast_tail.ready().unwrap().len(), 5);

        let ma = report.moving_averages.ready().unwrap();
        assert_eq!(ma.defined_count(30), 171);
        assert_eq!(ma.defined_count(90), 111);

        let components = report.components.ready().unwrap();
        assert_eq!(components.trend.len(), 565);
        assert!(components.seasonal.contains_key("monthly"));
    }

    #[tokio::test]
    async fn unknown_ticker_marks_every_panel_unavailable() {
        let f = fetcher(FakeProvider::default());
        let request = DashboardRequest::new("ZZZZINVALID", 3).unwrap();
        let report = build_dashboard(&f, &Settings::default(), &request, d(2024, 1, 2)).await;

        assert_eq!(report.ready_panels(), 0);
        assert_eq!(
            report.forecast,
            Panel::unavailable("no price data for ZZZZINVALID")
        );
    }

    #[tokio::test]
    async fn provider_failure_degrades_instead_of_failing() {
        let f = fetcher(FakeProvider::default().failing("AAPL"));
        let request = DashboardRequest::with_defaults(&Settings::default());
        let report = build_dashboard(&f, &Settings::default(), &request, d(2024, 1, 2)).await;

        assert_eq!(report.horizon_years, 3);
        assert_eq!(report.ready_panels(), 0);
        assert!(matches!(report.recent, Panel::Unavailable { ref reason } if reason.contains("unavailable")));
    }

    #[tokio::test]
    async fn forecast_failure_only_blanks_forecast_panels() {
        let f = fetcher(FakeProvider::default().with("AAPL", daily_bars(d(2024, 1, 2), &[100.0])));
        let request = DashboardRequest::new("AAPL", 2).unwrap();
        let report = build_dashboard(&f, &Settings::default(), &request, d(2024, 1, 3)).await;

        assert!(report.recent.is_ready());
        assert!(report.price_chart.is_ready());
        assert!(report.volume_chart.is_ready());
        assert!(report.moving_averages.is_ready());
        assert!(!report.forecast.is_ready());
        assert!(!report.forecast_tail.is_ready());
        assert!(!report.components.is_ready());
    }

    #[test]
    fn horizon_outside_range_is_rejected() {
        assert_eq!(
            DashboardRequest::new("AAPL", 5).unwrap_err(),
            ForecastError::InvalidHorizon { years: 5 }
        );
    }

    #[test]
    fn panels_serialize_with_status_tag() {
        let ready: Panel<Vec<u32>> = Panel::Ready(vec![1]);
        let gone: Panel<Vec<u32>> = Panel::unavailable("no data");
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            serde_json::json!({"status": "ready", "data": [1]})
        );
        assert_eq!(
            serde_json::to_value(&gone).unwrap(),
            serde_json::json!({"status": "unavailable", "data": {"reason": "no data"}})
        );
    }
}
