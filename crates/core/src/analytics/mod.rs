pub mod moving_average;

pub use moving_average::{compute_moving_averages, DerivedSeries, DEFAULT_SMA_WINDOWS};
