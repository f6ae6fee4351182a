//! Client-side composition root.
//!
//! Built once in `main` from configuration. Owns the station sources, the
//! caches and the local stores; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::config::AppConfig;
use common::{Error, ForecastPoint, Location, Measurement, SourceKind, TrendResult};
use forecast_client::{ForecastSource, HourWindow, OpenMeteoClient};
use pipeline::{
    BlobStore, Debouncer, DisplaySettings, FileBlobStore, GenerationGate, HistoryStore,
    ResourceKind, SettingsStore, SingleFlightCache, TrendAnalyzer,
};
use station_client::{build_source, MeasurementSource};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// What a completed refresh produced.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub measurement: Measurement,
    pub trend: TrendResult,
}

/// State fed by refreshes. Guarded as one unit so a generation check and the
/// writes that follow it cannot interleave with a source switch.
struct LiveState {
    latest: Option<Measurement>,
    trend: TrendAnalyzer,
}

pub struct WindApp {
    sources: HashMap<SourceKind, Arc<dyn MeasurementSource>>,
    forecast_source: Arc<dyn ForecastSource>,
    location: Location,
    forecast_days: u32,
    station_ttl: Duration,
    forecast_ttl: Duration,

    selected: RwLock<SourceKind>,
    station_cache: SingleFlightCache<Measurement>,
    forecast_cache: SingleFlightCache<Vec<ForecastPoint>>,
    live: Mutex<LiveState>,
    /// Locked after `live` when both are needed.
    history: Mutex<HistoryStore>,
    settings: SettingsStore,

    generation: GenerationGate,
    switch_debounce: Debouncer,
}

impl WindApp {
    /// Wire real clients and file-backed stores from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut sources: HashMap<SourceKind, Arc<dyn MeasurementSource>> = HashMap::new();
        for kind in [SourceKind::Ambient, SourceKind::Proxied] {
            sources.insert(kind, build_source(kind, &config.station)?);
        }

        let window = HourWindow {
            start_hour: config.forecast.start_hour,
            end_hour: config.forecast.end_hour,
            step: config.forecast.hour_step,
        };
        let forecast = OpenMeteoClient::new(
            &config.forecast.base_url,
            window,
            config.forecast.timeout_secs,
        )?;

        let blob: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(&config.history.data_dir)?);
        Ok(Self::new(config, sources, Arc::new(forecast), blob))
    }

    /// Assemble from injected parts.
    pub fn new(
        config: &AppConfig,
        sources: HashMap<SourceKind, Arc<dyn MeasurementSource>>,
        forecast_source: Arc<dyn ForecastSource>,
        blob: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            sources,
            forecast_source,
            location: config.forecast.location(),
            forecast_days: config.forecast.days,
            station_ttl: Duration::from_secs(config.cache.station_ttl_secs),
            forecast_ttl: Duration::from_secs(config.cache.forecast_ttl_secs),
            selected: RwLock::new(config.station.source),
            station_cache: SingleFlightCache::new(),
            forecast_cache: SingleFlightCache::new(),
            live: Mutex::new(LiveState {
                latest: None,
                trend: TrendAnalyzer::from_config(&config.trend),
            }),
            history: Mutex::new(HistoryStore::from_config(&config.history, blob.clone())),
            settings: SettingsStore::from_config(&config.client, blob),
            generation: GenerationGate::new(),
            switch_debounce: Debouncer::new(Duration::from_millis(config.client.debounce_ms)),
        }
    }

    pub async fn selected_source(&self) -> SourceKind {
        *self.selected.read().await
    }

    pub async fn latest(&self) -> Option<Measurement> {
        self.live.lock().await.latest.clone()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn display_settings(&self) -> DisplaySettings {
        self.settings.get()
    }

    pub fn history(&self) -> &Mutex<HistoryStore> {
        &self.history
    }

    pub async fn trend(&self) -> TrendResult {
        self.live.lock().await.trend.analyze_trend()
    }

    fn source(&self, kind: SourceKind) -> Result<Arc<dyn MeasurementSource>, Error> {
        self.sources
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no client registered for {kind}")))
    }

    /// Fetch the selected station's latest reading and feed it to the trend
    /// window and history. Returns `None` when a newer refresh or a source
    /// switch superseded this one while it was in flight.
    pub async fn refresh_measurement(&self) -> Result<Option<Snapshot>, Error> {
        let generation = self.generation.begin();
        let kind = self.selected_source().await;
        let source = self.source(kind)?;

        let measurement = self
            .station_cache
            .get_or_fetch(ResourceKind::Station(kind), false, self.station_ttl, move || {
                async move { source.fetch_latest().await }
            })
            .await?;

        let snapshot = self.commit(generation, measurement).await;
        if snapshot.is_none() {
            debug!(generation, "Discarding superseded {} reading", kind);
        }
        Ok(snapshot)
    }

    /// Apply a fetched reading if `generation` is still current, checked
    /// while holding the live state.
    async fn commit(&self, generation: u64, measurement: Measurement) -> Option<Snapshot> {
        let mut live = self.live.lock().await;
        if !self.generation.is_current(generation) {
            return None;
        }

        live.latest = Some(measurement.clone());
        live.trend.add(&measurement);
        let trend = live.trend.analyze_trend();

        if let Err(e) = self.history.lock().await.append(measurement.clone()) {
            warn!("Failed to persist history: {}", e);
        }

        Some(Snapshot { measurement, trend })
    }

    /// Supersede every in-flight refresh and forget the current source's
    /// live state.
    async fn reset_live(&self) {
        let mut live = self.live.lock().await;
        self.generation.begin();
        live.latest = None;
        live.trend.clear();
    }

    /// Forecast from cache, or a single shared upstream fetch.
    pub async fn refresh_forecast(&self, force: bool) -> Result<Vec<ForecastPoint>, Error> {
        let source = Arc::clone(&self.forecast_source);
        let location = self.location.clone();
        let days = self.forecast_days;
        self.forecast_cache
            .get_or_fetch(ResourceKind::Forecast, force, self.forecast_ttl, move || {
                async move { source.fetch_forecast(&location, days).await }
            })
            .await
    }

    /// Last forecast fetched, even if it is past its TTL.
    pub fn cached_forecast(&self) -> Option<Vec<ForecastPoint>> {
        self.forecast_cache
            .peek(ResourceKind::Forecast)
            .map(|entry| entry.payload)
    }

    /// Switch the live source. Rapid switches are debounced so only the last
    /// one takes effect; it then resyncs from scratch. Returns `Ok(None)` if a
    /// later switch superseded this call.
    pub async fn switch_source(&self, kind: SourceKind) -> Result<Option<Snapshot>, Error> {
        if !self.switch_debounce.settle().await {
            debug!("Source switch to {} superseded", kind);
            return Ok(None);
        }
        self.source(kind)?;

        info!("Switching live source to {}", kind);
        *self.selected.write().await = kind;
        self.reset_live().await;
        self.station_cache.invalidate(ResourceKind::Station(kind));

        self.refresh_measurement().await
    }
}
