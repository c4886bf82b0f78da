pub mod normalize;

pub use normalize::{localize, normalize, to_table, NormalizedRow, NormalizedTable};
