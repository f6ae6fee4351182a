//! Unified error type for the wind pipeline.
//!
//! Payloads are plain strings so the error is `Clone`: a single-flight fetch
//! hands the same failure to every waiter.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected upstream payload: {0}")]
    UpstreamFormat(String),

    #[error("No device data: {0}")]
    NoDevice(String),

    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl Error {
    /// Short machine-readable tag, used in logs and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::UpstreamFormat(_) => "upstream_format",
            Error::NoDevice(_) => "no_device",
            Error::Auth(_) => "auth",
            Error::Store(_) => "store",
            Error::ForecastUnavailable(_) => "forecast_unavailable",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
        }
    }
}
