//! Shared types, config, and error definitions for kitewatch.

pub mod config;
pub mod error;
pub mod http;
pub mod safety;
pub mod types;
pub mod units;

pub use config::AppConfig;
pub use error::Error;
pub use safety::{classify, SafetyLevel, SafetyVerdict};
pub use types::*;
pub use units::{kmh_to_knots, knots_to_kmh, mph_to_knots, SpeedUnit, TemperatureUnit};

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
