use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    OneMinute,
}

impl Granularity {
    /// Interval string understood by the chart endpoint.
    pub fn as_interval(self) -> &'static str {
        match self {
            Granularity::Daily => "1d",
            Granularity::OneMinute => "1m",
        }
    }
}

/// Bar timestamp with its localization state made explicit.
///
/// Providers hand out `Naive` wall-clock values. The normalizer turns them into
/// `Localized` values exactly once; a `Localized` timestamp is only ever converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarTimestamp {
    Naive(NaiveDateTime),
    Localized(DateTime<Tz>),
}

impl BarTimestamp {
    pub fn is_localized(&self) -> bool {
        matches!(self, BarTimestamp::Localized(_))
    }

    /// Calendar date as seen in the timestamp's own wall clock.
    pub fn date(&self) -> NaiveDate {
        match self {
            BarTimestamp::Naive(ts) => ts.date(),
            BarTimestamp::Localized(ts) => ts.date_naive(),
        }
    }

    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            BarTimestamp::Naive(ts) => *ts,
            BarTimestamp::Localized(ts) => ts.naive_local(),
        }
    }
}

impl Serialize for BarTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BarTimestamp::Naive(ts) => {
                serializer.collect_str(&ts.format("%Y-%m-%dT%H:%M:%S"))
            }
            BarTimestamp::Localized(ts) => serializer.collect_str(&ts.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub timestamp: BarTimestamp,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub granularity: Granularity,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn empty(ticker: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            ticker: ticker.into(),
            granularity,
            bars: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn closes(&self) -> Vec<Option<f64>> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn first_open(&self) -> Option<f64> {
        self.bars.first().and_then(|b| b.open)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().and_then(|b| b.close)
    }

    /// Trailing `n` bars, oldest first.
    pub fn tail(&self, n: usize) -> &[PriceBar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: Option<f64>) -> PriceBar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PriceBar {
            timestamp: BarTimestamp::Naive(ts),
            open: Some(1.0),
            high: None,
            low: None,
            close,
            volume: Some(10),
        }
    }

    #[test]
    fn tail_is_clamped_to_series_length() {
        let series = PriceSeries {
            ticker: "AAPL".to_string(),
            granularity: Granularity::Daily,
            bars: vec![bar(2, Some(1.0)), bar(3, Some(2.0)), bar(4, None)],
        };
        assert_eq!(series.tail(2).len(), 2);
        assert_eq!(series.tail(10).len(), 3);
        assert_eq!(series.tail(2)[0].close, Some(2.0));
        assert_eq!(series.last_close(), None);
        assert_eq!(series.first_open(), Some(1.0));
    }

    #[test]
    fn serializes_timestamps_by_state() {
        let naive = bar(2, Some(1.0));
        let v = serde_json::to_value(&naive).unwrap();
        assert_eq!(v["timestamp"], "2024-01-02T00:00:00");

        let localized = chrono_tz::US::Eastern
            .with_ymd_and_hms(2024, 1, 2, 9, 30, 0)
            .unwrap();
        let mut b = naive.clone();
        b.timestamp = BarTimestamp::Localized(localized);
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["timestamp"], "2024-01-02T09:30:00-05:00");
        assert!(b.timestamp.is_localized());
        assert_eq!(b.timestamp.date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }
}
