// Public API - engine, data types, and export functions
pub mod config;
pub mod error;
pub mod export;
pub mod lookup;
pub mod probe;
pub mod stats;
pub mod trace;
