//! Multi-year forecast on top of the Prophet model from `augurs`.
//!
//! The fit works on `(date, close)` pairs only. Prophet supplies the piecewise-linear trend,
//! the Fourier seasonalities and the sampled uncertainty interval; this module configures it
//! for the dashboard and maps its output back onto calendar dates.

use super::error::ForecastError;
use crate::domain::PriceSeries;
use augurs::prophet::wasmstan::WasmstanOptimizer;
use augurs::prophet::{
    IntervalWidth, PositiveFloat, PredictionData, Predictions, Prophet, ProphetOptions,
    Seasonality as ProphetSeasonality, SeasonalityOption, TrainingData,
};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

const DAYS_PER_YEAR: i64 = 365;

/// Extra seasonality added on top of Prophet's built-in yearly/weekly/daily terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomSeasonality {
    pub name: String,
    pub period_days: f64,
    pub fourier_order: u32,
}

impl CustomSeasonality {
    pub fn new(name: &str, period_days: f64, fourier_order: u32) -> Self {
        Self {
            name: name.to_string(),
            period_days,
            fourier_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub yearly: bool,
    pub weekly: bool,
    pub daily: bool,
    pub custom: Vec<CustomSeasonality>,
    pub interval_width: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            yearly: true,
            weekly: true,
            daily: false,
            custom: vec![CustomSeasonality::new("monthly", 30.5, 5)],
            interval_width: 0.8,
        }
    }
}

impl ForecastConfig {
    /// Names and periods (days) of every enabled seasonal component.
    pub fn components(&self) -> Vec<(String, f64)> {
        let builtin = [
            (self.yearly, "yearly", 365.25),
            (self.weekly, "weekly", 7.0),
            (self.daily, "daily", 1.0),
        ];
        builtin
            .into_iter()
            .filter(|(enabled, _, _)| *enabled)
            .map(|(_, name, period)| (name.to_string(), period))
            .chain(self.custom.iter().map(|s| (s.name.clone(), s.period_days)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let invalid = |msg: String| Err(ForecastError::InvalidConfig(msg));

        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return invalid(format!("interval_width must be in (0, 1), got {}", self.interval_width));
        }

        let mut names = std::collections::HashSet::new();
        for (name, _) in self.components() {
            if !names.insert(name.clone()) {
                return invalid(format!("duplicate seasonality name {name:?}"));
            }
        }
        for s in &self.custom {
            if !(s.period_days > 0.0) || s.fourier_order == 0 {
                return invalid(format!(
                    "seasonality {:?} needs a positive period and order",
                    s.name
                ));
            }
        }
        Ok(())
    }

    fn prophet_options(&self) -> Result<ProphetOptions, ForecastError> {
        let interval_width = IntervalWidth::try_from(self.interval_width)
            .map_err(|e| ForecastError::InvalidConfig(e.to_string()))?;
        Ok(ProphetOptions {
            yearly_seasonality: SeasonalityOption::Manual(self.yearly),
            weekly_seasonality: SeasonalityOption::Manual(self.weekly),
            daily_seasonality: SeasonalityOption::Manual(self.daily),
            interval_width,
            ..Default::default()
        })
    }
}

/// Forecast horizon in whole years, 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForecastHorizon {
    years: u32,
}

impl ForecastHorizon {
    pub const MIN_YEARS: u32 = 1;
    pub const MAX_YEARS: u32 = 4;

    pub fn from_years(years: u32) -> Result<Self, ForecastError> {
        if (Self::MIN_YEARS..=Self::MAX_YEARS).contains(&years) {
            Ok(Self { years })
        } else {
            Err(ForecastError::InvalidHorizon { years })
        }
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn days(&self) -> usize {
        (self.years as i64 * DAYS_PER_YEAR) as usize
    }
}

impl Default for ForecastHorizon {
    fn default() -> Self {
        Self { years: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    /// Seasonal contributions keyed by seasonality name.
    pub components: BTreeMap<String, f64>,
}

/// One period of a seasonal component, sampled once per day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AdditiveModel {
    config: ForecastConfig,
}

impl AdditiveModel {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn fit(&self, series: &PriceSeries) -> Result<FittedModel, ForecastError> {
        self.config.validate()?;
        let history = training_points(series)?;

        let mut prophet = Prophet::new(self.config.prophet_options()?, WasmstanOptimizer::new());
        for s in &self.config.custom {
            let period = PositiveFloat::try_from(s.period_days)
                .map_err(|e| ForecastError::InvalidConfig(e.to_string()))?;
            let order = NonZeroU32::new(s.fourier_order).ok_or_else(|| {
                ForecastError::InvalidConfig(format!("seasonality {:?} needs a positive order", s.name))
            })?;
            prophet
                .add_seasonality(s.name.clone(), ProphetSeasonality::new(period, order))
                .map_err(model_error)?;
        }

        let ds = history.iter().map(|(d, _)| date_to_ts(*d)).collect();
        let y = history.iter().map(|(_, y)| *y).collect();
        let data = TrainingData::new(ds, y).map_err(model_error)?;
        prophet.fit(data, Default::default()).map_err(model_error)?;

        tracing::debug!(points = history.len(), "forecast model fitted");

        Ok(FittedModel {
            prophet,
            components: self.config.components(),
            history,
        })
    }
}

pub struct FittedModel {
    prophet: Prophet<WasmstanOptimizer>,
    components: Vec<(String, f64)>,
    history: Vec<(NaiveDate, f64)>,
}

impl fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittedModel")
            .field("components", &self.components)
            .field("history_points", &self.history.len())
            .finish()
    }
}

impl FittedModel {
    /// Training points after dropping missing closes and collapsing duplicate dates.
    pub fn history(&self) -> &[(NaiveDate, f64)] {
        &self.history
    }

    pub fn last_date(&self) -> NaiveDate {
        self.history[self.history.len() - 1].0
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Records for every history date followed by `horizon_days` consecutive days.
    pub fn predict(&self, horizon_days: usize) -> Result<Vec<ForecastRecord>, ForecastError> {
        let last = self.last_date();
        let future = (1..=horizon_days as i64).map(|i| last + Duration::days(i));
        let dates: Vec<NaiveDate> = self.history.iter().map(|(d, _)| *d).chain(future).collect();

        let predictions = self.run(&dates)?;
        let n = dates.len();
        let yhat = &predictions.yhat;
        if yhat.point.len() != n || predictions.trend.point.len() != n {
            return Err(ForecastError::Numerical(format!(
                "model returned {} points for {n} dates",
                yhat.point.len()
            )));
        }

        let mut out = Vec::with_capacity(n);
        for (i, ds) in dates.into_iter().enumerate() {
            let point = yhat.point[i];
            let lower = bound(&yhat.lower, i).unwrap_or(point).min(point);
            let upper = bound(&yhat.upper, i).unwrap_or(point).max(point);
            if !(point.is_finite() && lower.is_finite() && upper.is_finite()) {
                return Err(ForecastError::Numerical(format!("non-finite forecast at {ds}")));
            }

            let components = self
                .components
                .iter()
                .filter_map(|(name, _)| {
                    let values = predictions.seasonalities.get(name.as_str())?;
                    Some((name.clone(), *values.point.get(i)?))
                })
                .collect();

            out.push(ForecastRecord {
                ds,
                yhat: point,
                yhat_lower: lower,
                yhat_upper: upper,
                trend: predictions.trend.point[i],
                components,
            });
        }
        Ok(out)
    }

    /// One period of the named seasonal component, starting on a Sunday for `weekly`
    /// and on January 1st otherwise.
    pub fn seasonal_profile(&self, name: &str) -> Result<Option<Vec<ProfilePoint>>, ForecastError> {
        let Some((_, period)) = self.components.iter().find(|(n, _)| n == name) else {
            return Ok(None);
        };

        let last = self.last_date();
        let start = if name == "weekly" {
            let back = last.weekday().num_days_from_sunday() as i64;
            last - Duration::days(back)
        } else {
            NaiveDate::from_ymd_opt(last.year(), 1, 1).unwrap_or(last)
        };

        let samples = period.ceil().max(1.0) as i64;
        let dates: Vec<NaiveDate> = (0..samples).map(|i| start + Duration::days(i)).collect();
        let predictions = self.run(&dates)?;
        let Some(values) = predictions.seasonalities.get(name) else {
            return Ok(None);
        };

        Ok(Some(
            dates
                .into_iter()
                .zip(&values.point)
                .map(|(date, value)| ProfilePoint { date, value: *value })
                .collect(),
        ))
    }

    fn run(&self, dates: &[NaiveDate]) -> Result<Predictions, ForecastError> {
        let ds = dates.iter().map(|d| date_to_ts(*d)).collect();
        self.prophet
            .predict(Some(PredictionData::new(ds)))
            .map_err(model_error)
    }
}

/// Fit the default dashboard model.
pub fn fit(series: &PriceSeries) -> Result<FittedModel, ForecastError> {
    AdditiveModel::default().fit(series)
}

pub fn predict(model: &FittedModel, horizon_days: usize) -> Result<Vec<ForecastRecord>, ForecastError> {
    model.predict(horizon_days)
}

fn model_error(err: impl fmt::Display) -> ForecastError {
    ForecastError::Model(err.to_string())
}

fn bound(values: &Option<Vec<f64>>, i: usize) -> Option<f64> {
    values.as_ref().and_then(|v| v.get(i).copied())
}

fn date_to_ts(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

fn training_points(series: &PriceSeries) -> Result<Vec<(NaiveDate, f64)>, ForecastError> {
    let mut by_date = BTreeMap::new();
    let mut any_close = false;
    for bar in &series.bars {
        if let Some(close) = bar.close.filter(|c| c.is_finite()) {
            any_close = true;
            by_date.insert(bar.timestamp.date(), close);
        }
    }

    if !series.bars.is_empty() && !any_close {
        return Err(ForecastError::NoNumericCloses {
            bars: series.bars.len(),
        });
    }
    if by_date.len() < 2 {
        return Err(ForecastError::InsufficientData {
            usable: by_date.len(),
        });
    }
    Ok(by_date.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Granularity;
    use crate::ingest::fetcher::testing::daily_bars;
    use chrono::Weekday;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series_from(start: NaiveDate, closes: &[f64]) -> PriceSeries {
        PriceSeries {
            ticker: "AAPL".to_string(),
            granularity: Granularity::Daily,
            bars: daily_bars(start, closes),
        }
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                150.0 + 0.1 * x + 4.0 * (x / 9.0).sin() + 1.5 * ((x * 7.3).sin())
            })
            .collect()
    }

    #[test]
    fn history_plus_horizon_rows_with_ordered_bounds() {
        let s = series_from(day(2022, 1, 3), &wavy(400));
        let model = fit(&s).unwrap();
        let out = predict(&model, 120).unwrap();

        assert_eq!(out.len(), 400 + 120);
        for r in &out {
            assert!(r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper, "{r:?}");
        }
        for name in ["yearly", "weekly", "monthly"] {
            assert!(out[0].components.contains_key(name), "missing {name}");
        }
        assert!(!out[0].components.contains_key("daily"));
    }

    #[test]
    fn one_year_history_with_one_year_horizon() {
        let start = day(2023, 1, 1);
        let s = series_from(start, &wavy(365));
        let last = start + Duration::days(364);

        let out = predict(&fit(&s).unwrap(), ForecastHorizon::from_years(1).unwrap().days()).unwrap();
        assert_eq!(out.len(), 730);
        assert_eq!(out[364].ds, last);
        assert_eq!(out[365].ds, last + Duration::days(1));
        assert_eq!(out[729].ds, last + Duration::days(365));
    }

    #[test]
    fn fewer_than_two_points_is_insufficient() {
        let err = fit(&series_from(day(2024, 1, 2), &[100.0])).unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { usable: 1 });
        assert!(err.is_insufficient_data());

        let err = fit(&series_from(day(2024, 1, 2), &[])).unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { usable: 0 });
    }

    #[test]
    fn two_distinct_dates_are_enough() {
        let s = series_from(day(2024, 1, 2), &[100.0, 102.0]);
        let out = fit(&s).unwrap().predict(10).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(out[0].ds, day(2024, 1, 2));
        assert!(out.iter().all(|r| r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper));
    }

    #[test]
    fn all_missing_closes_are_reported() {
        let mut s = series_from(day(2024, 1, 2), &[1.0, 2.0, 3.0]);
        for bar in &mut s.bars {
            bar.close = None;
        }
        let err = fit(&s).unwrap_err();
        assert_eq!(err, ForecastError::NoNumericCloses { bars: 3 });
        assert!(err.to_string().starts_with("insufficient data"));
    }

    #[test]
    fn duplicate_dates_keep_last_and_missing_closes_drop() {
        let mut s = series_from(day(2024, 1, 2), &[10.0, 11.0, 12.0, 13.0]);
        s.bars[2].timestamp = s.bars[1].timestamp;
        s.bars[3].close = None;
        // Unsorted input is fine.
        s.bars.swap(0, 1);

        let model = fit(&s).unwrap();
        assert_eq!(model.history(), &[(day(2024, 1, 2), 10.0), (day(2024, 1, 3), 12.0)]);
    }

    #[test]
    fn linear_history_extrapolates_its_line() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + 0.5 * i as f64).collect();
        let out = fit(&series_from(day(2021, 6, 1), &closes)).unwrap().predict(30).unwrap();

        let expected = 100.0 + 0.5 * 229.0;
        assert!((out[229].yhat - expected).abs() < 2.0, "{}", out[229].yhat);
    }

    #[test]
    fn intervals_widen_further_ahead() {
        let model = fit(&series_from(day(2020, 1, 1), &wavy(600))).unwrap();
        let out = model.predict(365).unwrap();
        let mean_width = |rows: &[ForecastRecord]| {
            rows.iter().map(|r| r.yhat_upper - r.yhat_lower).sum::<f64>() / rows.len() as f64
        };

        assert!(mean_width(&out[935..965]) > mean_width(&out[600..630]));
    }

    #[test]
    fn trend_plus_components_sum_to_point_estimate() {
        let model = fit(&series_from(day(2020, 1, 1), &wavy(300))).unwrap();
        for r in model.predict(30).unwrap() {
            let total = r.trend + r.components.values().sum::<f64>();
            assert!((total - r.yhat).abs() < 1e-6 * r.yhat.abs().max(1.0), "{r:?}");
        }
    }

    #[test]
    fn weekly_profile_covers_one_week() {
        let model = fit(&series_from(day(2020, 1, 1), &wavy(300))).unwrap();
        let weekly = model.seasonal_profile("weekly").unwrap().unwrap();
        assert_eq!(weekly.len(), 7);
        assert_eq!(weekly[0].date.weekday(), Weekday::Sun);

        let yearly = model.seasonal_profile("yearly").unwrap().unwrap();
        assert_eq!(yearly.len(), 366);
        assert_eq!(yearly[0].date, day(2020, 1, 1));
        assert!(model.seasonal_profile("daily").unwrap().is_none());
    }

    #[test]
    fn horizon_is_limited_to_four_years() {
        assert_eq!(ForecastHorizon::from_years(3).unwrap().days(), 1095);
        assert_eq!(ForecastHorizon::default().years(), 3);
        assert_eq!(
            ForecastHorizon::from_years(0).unwrap_err(),
            ForecastError::InvalidHorizon { years: 0 }
        );
        assert!(ForecastHorizon::from_years(5).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_before_fitting() {
        let model = AdditiveModel::new(ForecastConfig {
            interval_width: 1.5,
            ..ForecastConfig::default()
        });
        let err = model.fit(&series_from(day(2024, 1, 2), &[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfig(_)));

        let dup = ForecastConfig {
            custom: vec![CustomSeasonality::new("weekly", 7.0, 2)],
            ..ForecastConfig::default()
        };
        assert!(dup.validate().is_err());

        let names: Vec<String> = ForecastConfig::default()
            .components()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["yearly", "weekly", "monthly"]);
    }
}
