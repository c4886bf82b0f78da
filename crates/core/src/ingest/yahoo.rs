use crate::config::Settings;
use crate::domain::{BarTimestamp, Granularity, PriceBar, PriceSeries};
use crate::ingest::provider::{BarRange, BarsRequest, MarketDataProvider};
use crate::ingest::types::{ChartResponse, ChartResult};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use reqwest::StatusCode;
use std::time::Duration;

const CHART_PATH: &str = "/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; smp/0.1)";

#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    base_backoff: Duration,
}

enum Attempt {
    Done(PriceSeries),
    Retry(anyhow::Error),
}

impl YahooChartProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.data_provider_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build chart provider http client")?;

        Ok(Self {
            http,
            base_url: settings.data_provider_base_url.clone(),
            retries: settings.data_provider_retries.max(1),
            base_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    fn url(&self, ticker: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            CHART_PATH,
            ticker
        )
    }

    fn query(request: &BarsRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("interval", request.granularity.as_interval().to_string()),
            ("includePrePost", "false".to_string()),
        ];
        match request.range {
            BarRange::Between { start, end } => {
                params.push(("period1", start.timestamp().to_string()));
                params.push(("period2", end.timestamp().to_string()));
            }
            BarRange::CurrentDay => params.push(("range", "1d".to_string())),
        }
        params
    }

    async fn fetch_once(&self, request: &BarsRequest) -> Result<Attempt> {
        let res = match self
            .http
            .get(self.url(&request.ticker))
            .query(&Self::query(request))
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                return Ok(Attempt::Retry(
                    anyhow::Error::new(err).context("chart request failed"),
                ))
            }
        };

        let status = res.status();
        let text = match res.text().await {
            Ok(text) => text,
            Err(err) => {
                return Ok(Attempt::Retry(
                    anyhow::Error::new(err).context("failed to read chart response"),
                ))
            }
        };

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Ok(Attempt::Retry(anyhow::anyhow!(
                "chart HTTP {status} for {}",
                request.ticker
            )));
        }

        if status == StatusCode::NOT_FOUND {
            tracing::info!(ticker = %request.ticker, "chart symbol not found; returning empty series");
            return Ok(Attempt::Done(PriceSeries::empty(
                &request.ticker,
                request.granularity,
            )));
        }

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .with_context(|| format!("chart response is not valid JSON (HTTP {status}): {text}"))?;

        if let Some(err) = parsed.chart.error.as_ref() {
            if err.is_unknown_symbol() {
                tracing::info!(ticker = %request.ticker, code = %err.code, "chart reported no data");
                return Ok(Attempt::Done(PriceSeries::empty(
                    &request.ticker,
                    request.granularity,
                )));
            }
            anyhow::bail!("chart API error {}: {}", err.code, err.description);
        }

        if !status.is_success() {
            anyhow::bail!("chart HTTP {status}: {text}");
        }

        let result = parsed.chart.result.and_then(|r| r.into_iter().next());
        let series = match result {
            Some(result) => series_from_result(&request.ticker, request.granularity, result),
            None => PriceSeries::empty(&request.ticker, request.granularity),
        };
        Ok(Attempt::Done(series))
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_bars(&self, request: &BarsRequest) -> Result<PriceSeries> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(request).await? {
                Attempt::Done(series) => {
                    tracing::debug!(
                        ticker = %request.ticker,
                        interval = request.granularity.as_interval(),
                        bars = series.len(),
                        "chart fetch complete"
                    );
                    return Ok(series);
                }
                Attempt::Retry(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = self.base_backoff * (1 << (attempt - 1));
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        ticker = %request.ticker,
                        error = %err,
                        "chart fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

pub(crate) fn series_from_result(
    ticker: &str,
    granularity: Granularity,
    result: ChartResult,
) -> PriceSeries {
    let Some(timestamps) = result.timestamp else {
        return PriceSeries::empty(ticker, granularity);
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let offset = result.meta.gmtoffset.unwrap_or(0);

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let open = column_value(&quote.open, i);
        let high = column_value(&quote.high, i);
        let low = column_value(&quote.low, i);
        let close = column_value(&quote.close, i);
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
            continue;
        }

        let timestamp = match granularity {
            // Daily bars are keyed by the exchange-local session date.
            Granularity::Daily => match DateTime::<Utc>::from_timestamp(ts + offset, 0) {
                Some(dt) => BarTimestamp::Naive(dt.date_naive().and_time(NaiveTime::MIN)),
                None => continue,
            },
            Granularity::OneMinute => match DateTime::<Utc>::from_timestamp(ts, 0) {
                Some(dt) => BarTimestamp::Naive(dt.naive_utc()),
                None => continue,
            },
        };

        let volume = column_value(&quote.volume, i).map(|v| v.max(0.0).round() as u64);
        bars.push(PriceBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp.naive_local());
    PriceSeries {
        ticker: ticker.to_string(),
        granularity,
        bars,
    }
}

fn column_value(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten().filter(|v| v.is_finite())
}
