//! Live wind station clients.
//!
//! Each upstream station is an independent [`MeasurementSource`]. Which one
//! feeds the pipeline is an explicit [`SourceKind`] choice made by the
//! caller; nothing here checks availability or falls back on its own.

pub mod ambient;
pub mod proxied;

use std::sync::Arc;

use async_trait::async_trait;
use common::config::StationConfig;
use common::http;
use common::{Error, Measurement, SourceKind};

pub use ambient::AmbientStationClient;
pub use proxied::ProxiedStationClient;

/// Anything that can produce the latest canonical measurement.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Which station this is.
    fn kind(&self) -> SourceKind;

    /// Fetch and normalize the most recent reading.
    ///
    /// Fails with `Error::Network`, `Error::UpstreamFormat` or
    /// `Error::NoDevice`; errors are never retried here.
    async fn fetch_latest(&self) -> Result<Measurement, Error>;
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, Error> {
    http::build_client(timeout_secs)
        .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))
}

/// Build the client for one source kind.
pub fn build_source(
    kind: SourceKind,
    cfg: &StationConfig,
) -> Result<Arc<dyn MeasurementSource>, Error> {
    Ok(match kind {
        SourceKind::Ambient => Arc::new(AmbientStationClient::new(
            &cfg.ambient_base_url,
            &cfg.application_key,
            &cfg.api_key,
            cfg.timeout_secs,
        )?),
        SourceKind::Proxied => Arc::new(ProxiedStationClient::new(
            &cfg.proxy_base_url,
            cfg.timeout_secs,
        )?),
    })
}
