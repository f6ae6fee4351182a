//! Application configuration types.

use serde::{Deserialize, Serialize};

use crate::types::{Location, SourceKind};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Live station sources.
    #[serde(default)]
    pub station: StationConfig,

    /// Forecast source and hour window.
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Cache lifetimes per resource kind.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Trend window parameters.
    #[serde(default)]
    pub trend: TrendConfig,

    /// Local history retention.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Durable measurement store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Scheduled ingestion.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// History query endpoint limits.
    #[serde(default)]
    pub query: QueryConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-side refresh loop.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Station endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Source used by `watch` and by ingestion.
    #[serde(default)]
    pub source: SourceKind,
    /// Ambient Weather REST base URL.
    #[serde(default = "default_ambient_base_url")]
    pub ambient_base_url: String,
    /// Ambient Weather application key.
    #[serde(default)]
    pub application_key: String,
    /// Ambient Weather API key.
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the relay exposing `/api/wind-history`.
    #[serde(default = "default_proxy_base_url")]
    pub proxy_base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Forecast location and hour window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_forecast_base_url")]
    pub base_url: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Number of days requested from the source.
    #[serde(default = "default_forecast_days")]
    pub days: u32,
    /// First hour of day kept, inclusive.
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    /// Last hour of day kept, inclusive.
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    /// Step between kept hours.
    #[serde(default = "default_hour_step")]
    pub hour_step: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ForecastConfig {
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone.clone(),
        }
    }
}

/// Cache lifetimes (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_secs: u64,
    /// Zero means station reads are only coalesced, never reused.
    #[serde(default)]
    pub station_ttl_secs: u64,
}

/// Trend analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_reference_interval")]
    pub reference_interval_secs: u64,
    #[serde(default = "default_stable_threshold")]
    pub stable_threshold_pct: f64,
    #[serde(default = "default_trend_max_samples")]
    pub max_samples: usize,
}

/// Local history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding persisted blobs (history, settings).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_history_max_records")]
    pub max_records: usize,
    #[serde(default = "default_history_max_age_hours")]
    pub max_age_hours: i64,
}

/// Durable store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

/// Scheduled ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>`.
    #[serde(default)]
    pub cron_secret: String,
    /// Period of the in-process scheduler.
    #[serde(default = "default_ingest_interval")]
    pub interval_secs: u64,
    /// Return the existing row instead of inserting when the same source
    /// reading was already stored.
    #[serde(default)]
    pub dedupe_on_source_timestamp: bool,
}

/// History query limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_limit")]
    pub default_limit: u32,
    #[serde(default = "default_query_hours")]
    pub default_hours: i64,
    #[serde(default = "default_query_max_limit")]
    pub max_limit: u32,
    #[serde(default = "default_query_max_hours")]
    pub max_hours: i64,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Client refresh loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_ambient_base_url() -> String {
    "https://api.ambientweather.net".into()
}
fn default_proxy_base_url() -> String {
    "http://localhost:3000".into()
}
fn default_timeout_secs() -> u64 {
    30
}

fn default_forecast_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".into()
}
fn default_latitude() -> f64 {
    12.4958
}
fn default_longitude() -> f64 {
    99.9826
}
fn default_timezone() -> String {
    "Asia/Bangkok".into()
}
fn default_forecast_days() -> u32 {
    3
}
fn default_start_hour() -> u32 {
    6
}
fn default_end_hour() -> u32 {
    19
}
fn default_hour_step() -> u32 {
    1
}

fn default_forecast_ttl() -> u64 {
    300
}

fn default_reference_interval() -> u64 {
    600
}
fn default_stable_threshold() -> f64 {
    5.0
}
fn default_trend_max_samples() -> usize {
    240
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_history_max_records() -> usize {
    1000
}
fn default_history_max_age_hours() -> i64 {
    24
}

fn default_db_path() -> String {
    "data/wind.db".into()
}

fn default_ingest_interval() -> u64 {
    300
}

fn default_query_limit() -> u32 {
    100
}
fn default_query_hours() -> i64 {
    24
}
fn default_query_max_limit() -> u32 {
    1000
}
fn default_query_max_hours() -> i64 {
    24 * 30
}

fn default_bind() -> String {
    "0.0.0.0:3000".into()
}

fn default_update_interval() -> u64 {
    30
}
fn default_debounce_ms() -> u64 {
    300
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            ambient_base_url: default_ambient_base_url(),
            application_key: String::new(),
            api_key: String::new(),
            proxy_base_url: default_proxy_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: default_forecast_base_url(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            timezone: default_timezone(),
            days: default_forecast_days(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            hour_step: default_hour_step(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            forecast_ttl_secs: default_forecast_ttl(),
            station_ttl_secs: 0,
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            reference_interval_secs: default_reference_interval(),
            stable_threshold_pct: default_stable_threshold(),
            max_samples: default_trend_max_samples(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_records: default_history_max_records(),
            max_age_hours: default_history_max_age_hours(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cron_secret: String::new(),
            interval_secs: default_ingest_interval(),
            dedupe_on_source_timestamp: false,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
            default_hours: default_query_hours(),
            max_limit: default_query_max_limit(),
            max_hours: default_query_max_hours(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            debounce_ms: default_debounce_ms(),
        }
    }
}
