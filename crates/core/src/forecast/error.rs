use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Fewer than two distinct dates carry a numeric close.
    InsufficientData { usable: usize },
    /// The series has bars, but none of them has a numeric close.
    NoNumericCloses { bars: usize },
    InvalidHorizon { years: u32 },
    InvalidConfig(String),
    /// The underlying model rejected the data or failed to fit/predict.
    Model(String),
    Numerical(String),
}

impl ForecastError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData { .. } | ForecastError::NoNumericCloses { .. }
        )
    }
}

impl fmt::Display for ForecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastError::InsufficientData { usable } => write!(
                f,
                "insufficient data for forecasting: need at least 2 dated closes, got {usable}"
            ),
            ForecastError::NoNumericCloses { bars } => write!(
                f,
                "insufficient data for forecasting: all {bars} closing prices are missing"
            ),
            ForecastError::InvalidHorizon { years } => {
                write!(f, "forecast horizon must be 1..=4 years (got {years})")
            }
            ForecastError::InvalidConfig(detail) => write!(f, "invalid forecast config: {detail}"),
            ForecastError::Model(detail) => write!(f, "forecast model failed: {detail}"),
            ForecastError::Numerical(detail) => write!(f, "forecast produced invalid values: {detail}"),
        }
    }
}

impl std::error::Error for ForecastError {}
