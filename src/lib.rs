//! Per-channel variance statistics over collections of multi-channel
//! recordings, aggregated file by file without holding the collection in
//! memory.

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod flows;
pub mod progress;
pub mod stats;

pub use error::{Error, Result};
