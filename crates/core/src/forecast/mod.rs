//! Multi-year price forecasting with an additive trend + seasonality model.

pub mod error;
pub mod model;

pub use error::ForecastError;
pub use model::{
    fit, predict, AdditiveModel, CustomSeasonality, FittedModel, ForecastConfig, ForecastHorizon,
    ForecastRecord, ProfilePoint,
};
