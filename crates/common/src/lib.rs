//! Privid Common Utilities
//!
//! Shared infrastructure for all Privid crates:
//! - Error types and result aliases
//! - Drift-free frame decimation from the native to the analysis rate
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
