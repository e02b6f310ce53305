pub mod csv;
pub mod json;

pub use csv::*;
pub use json::*;
