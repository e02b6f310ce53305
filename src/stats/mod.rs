pub mod percentile;
pub mod tracker;

pub use percentile::*;
pub use tracker::*;
