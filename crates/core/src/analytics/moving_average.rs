//! Trailing simple moving averages over closing prices.

use crate::domain::{BarTimestamp, PriceSeries};
use serde::Serialize;

/// Windows plotted next to the closing price.
pub const DEFAULT_SMA_WINDOWS: [usize; 2] = [30, 90];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRow {
    pub timestamp: BarTimestamp,
    pub close: Option<f64>,
    /// One value per configured window, in the order of [`DerivedSeries::windows`].
    pub sma: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSeries {
    pub windows: Vec<usize>,
    pub rows: Vec<DerivedRow>,
}

impl DerivedSeries {
    /// Column of values for `window`, or `None` if it was not computed.
    pub fn column(&self, window: usize) -> Option<Vec<Option<f64>>> {
        let idx = self.windows.iter().position(|w| *w == window)?;
        Some(self.rows.iter().map(|r| r.sma[idx]).collect())
    }

    pub fn defined_count(&self, window: usize) -> usize {
        self.column(window)
            .map(|c| c.iter().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }
}

/// Mean of the trailing `w` closes (inclusive) at every position.
///
/// Positions with fewer than `w` bars so far, or whose window holds a missing close, are `None`.
pub fn compute_moving_averages(series: &PriceSeries, windows: &[usize]) -> anyhow::Result<DerivedSeries> {
    anyhow::ensure!(
        windows.iter().all(|w| *w > 0),
        "moving average windows must be positive (got {windows:?})"
    );

    let closes = series.closes();
    let columns: Vec<Vec<Option<f64>>> = windows.iter().map(|w| rolling_mean(&closes, *w)).collect();

    let rows = series
        .bars
        .iter()
        .enumerate()
        .map(|(i, bar)| DerivedRow {
            timestamp: bar.timestamp,
            close: bar.close,
            sma: columns.iter().map(|c| c[i]).collect(),
        })
        .collect();

    Ok(DerivedSeries {
        windows: windows.to_vec(),
        rows,
    })
}

fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    let mut missing = 0usize;

    for i in 0..values.len() {
        match values[i] {
            Some(v) => sum += v,
            None => missing += 1,
        }
        if i >= window {
            match values[i - window] {
                Some(v) => sum -= v,
                None => missing -= 1,
            }
        }

        if i + 1 < window || missing > 0 {
            out.push(None);
        } else {
            out.push(Some(sum / window as f64));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Granularity;
    use crate::ingest::fetcher::testing::daily_bars;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn series(closes: &[f64]) -> PriceSeries {
        PriceSeries {
            ticker: "AAPL".to_string(),
            granularity: Granularity::Daily,
            bars: daily_bars(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), closes),
        }
    }

    #[test]
    fn averages_trailing_window_inclusive() {
        let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = compute_moving_averages(&s, &[3]).unwrap();
        assert_eq!(
            out.column(3).unwrap(),
            vec![None, None, Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn missing_close_invalidates_windows_that_contain_it() {
        let mut s = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        s.bars[1].close = None;
        let out = compute_moving_averages(&s, &[2]).unwrap();
        assert_eq!(
            out.column(2).unwrap(),
            vec![None, None, None, Some(3.5), Some(4.5)]
        );
    }

    #[test]
    fn short_series_has_no_defined_values() {
        let s = series(&[10.0; 20]);
        let out = compute_moving_averages(&s, &DEFAULT_SMA_WINDOWS).unwrap();
        assert_eq!(out.defined_count(30), 0);
        assert_eq!(out.defined_count(90), 0);
        assert_eq!(out.rows.len(), 20);
    }

    #[test]
    fn empty_series_and_zero_window() {
        let s = series(&[]);
        assert!(compute_moving_averages(&s, &DEFAULT_SMA_WINDOWS).unwrap().rows.is_empty());
        assert!(compute_moving_averages(&s, &[0]).is_err());
    }

    proptest! {
        #[test]
        fn defined_counts_follow_window_sizes(closes in prop::collection::vec(1.0f64..500.0, 90..400)) {
            let s = series(&closes);
            let out = compute_moving_averages(&s, &DEFAULT_SMA_WINDOWS).unwrap();
            prop_assert_eq!(out.defined_count(30), closes.len() - 29);
            prop_assert_eq!(out.defined_count(90), closes.len() - 89);

            let sma30 = out.column(30).unwrap();
            prop_assert!(sma30[..29].iter().all(|v| v.is_none()));
            prop_assert!(sma30[29..].iter().all(|v| v.is_some()));
        }

        #[test]
        fn repeated_invocation_is_stable(closes in prop::collection::vec(1.0f64..500.0, 0..200)) {
            let s = series(&closes);
            let a = compute_moving_averages(&s, &DEFAULT_SMA_WINDOWS).unwrap();
            let b = compute_moving_averages(&s, &DEFAULT_SMA_WINDOWS).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
