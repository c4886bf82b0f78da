//! Timezone normalization for intraday bars.
//!
//! Bars arrive with [`BarTimestamp::Naive`] wall-clock values. [`normalize`] localizes those in
//! the source zone and converts everything into the display zone. Already-localized bars are
//! converted only, so a second pass never re-shifts them.
//!
//! Naive wall times in a DST-observing source zone can be ambiguous (fall-back) or nonexistent
//! (spring-forward). Ambiguous times take the earlier instant; nonexistent times move forward
//! minute by minute, at most two hours, before giving up.

use crate::domain::{BarTimestamp, PriceBar, PriceSeries};
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;

const MAX_GAP_SHIFT_MINUTES: i64 = 120;

/// Flat row with an explicit `datetime` column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub datetime: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTable {
    pub ticker: String,
    pub timezone: String,
    pub rows: Vec<NormalizedRow>,
}

/// Localize a naive wall-clock time in `tz`.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> anyhow::Result<DateTime<Tz>> {
    use chrono::offset::LocalResult::*;
    match tz.from_local_datetime(&naive) {
        Single(dt) => Ok(dt),
        Ambiguous(earliest, _) => Ok(earliest),
        None => {
            let mut t = naive;
            for _ in 0..MAX_GAP_SHIFT_MINUTES {
                t += chrono::Duration::minutes(1);
                if let Single(dt) = tz.from_local_datetime(&t) {
                    return Ok(dt);
                }
            }
            Err(anyhow::anyhow!("nonexistent local time {naive} in {tz}"))
        }
    }
}

fn to_display(ts: BarTimestamp, source_tz: Tz, display_tz: Tz) -> anyhow::Result<DateTime<Tz>> {
    let aware = match ts {
        BarTimestamp::Naive(naive) => localize(naive, source_tz)?,
        BarTimestamp::Localized(dt) => dt,
    };
    Ok(aware.with_timezone(&display_tz))
}

/// Localize naive timestamps in `source_tz` and convert every bar to `display_tz`.
pub fn normalize(series: &PriceSeries, source_tz: Tz, display_tz: Tz) -> anyhow::Result<PriceSeries> {
    let mut bars = Vec::with_capacity(series.bars.len());
    for bar in &series.bars {
        let dt = to_display(bar.timestamp, source_tz, display_tz)
            .with_context(|| format!("failed to normalize bar for {}", series.ticker))?;
        bars.push(PriceBar {
            timestamp: BarTimestamp::Localized(dt),
            ..bar.clone()
        });
    }

    Ok(PriceSeries {
        ticker: series.ticker.clone(),
        granularity: series.granularity,
        bars,
    })
}

/// Flatten a series into rows with an explicit timestamp column, rendered in `display_tz`.
pub fn to_table(series: &PriceSeries, display_tz: Tz) -> NormalizedTable {
    let rows = series
        .bars
        .iter()
        .map(|bar| {
            let datetime = match bar.timestamp {
                BarTimestamp::Localized(dt) => dt.with_timezone(&display_tz).to_rfc3339(),
                BarTimestamp::Naive(naive) => naive.format("%Y-%m-%dT%H:%M:%S").to_string(),
            };
            NormalizedRow {
                datetime,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }
        })
        .collect();

    NormalizedTable {
        ticker: series.ticker.clone(),
        timezone: display_tz.name().to_string(),
        rows,
    }
}
