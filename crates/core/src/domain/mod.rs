pub mod bar;

pub use bar::{BarTimestamp, Granularity, PriceBar, PriceSeries};
