//! Configuration loader: merges .env, config.toml and environment variables.

use common::config::AppConfig;
use common::{Error, SourceKind};
use std::path::Path;

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

pub fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.station.timeout_secs == 0 {
        issues.push("station.timeout_secs must be > 0".into());
    }
    if config.station.source == SourceKind::Proxied
        && config.station.proxy_base_url.trim().is_empty()
    {
        issues.push("station.proxy_base_url is required for the proxied source".into());
    }

    if !(-90.0..=90.0).contains(&config.forecast.latitude) {
        issues.push("forecast.latitude must be in [-90,90]".into());
    }
    if !(-180.0..=180.0).contains(&config.forecast.longitude) {
        issues.push("forecast.longitude must be in [-180,180]".into());
    }
    if config.forecast.timezone.trim().is_empty() {
        issues.push("forecast.timezone must not be empty".into());
    }
    if config.forecast.days == 0 || config.forecast.days > 16 {
        issues.push("forecast.days must be in [1,16]".into());
    }
    if config.forecast.start_hour > 23 || config.forecast.end_hour > 23 {
        issues.push("forecast.start_hour and forecast.end_hour must be in [0,23]".into());
    }
    if config.forecast.start_hour > config.forecast.end_hour {
        issues.push("forecast.start_hour must be <= forecast.end_hour".into());
    }
    if config.forecast.hour_step == 0 {
        issues.push("forecast.hour_step must be > 0".into());
    }

    if config.cache.forecast_ttl_secs == 0 {
        issues.push("cache.forecast_ttl_secs must be > 0".into());
    }

    if config.trend.reference_interval_secs == 0 {
        issues.push("trend.reference_interval_secs must be > 0".into());
    }
    if config.trend.stable_threshold_pct < 0.0 {
        issues.push("trend.stable_threshold_pct must be >= 0".into());
    }
    if config.trend.max_samples < 2 {
        issues.push("trend.max_samples must be >= 2".into());
    }

    if config.history.max_records == 0 {
        issues.push("history.max_records must be > 0".into());
    }
    if config.history.max_age_hours <= 0 {
        issues.push("history.max_age_hours must be > 0".into());
    }

    if config.store.db_path.trim().is_empty() {
        issues.push("store.db_path must not be empty".into());
    }
    if config.ingest.interval_secs == 0 {
        issues.push("ingest.interval_secs must be > 0".into());
    }

    if config.query.max_limit == 0 {
        issues.push("query.max_limit must be > 0".into());
    }
    if config.query.max_hours <= 0 {
        issues.push("query.max_hours must be > 0".into());
    }
    if config.query.default_limit == 0 || config.query.default_limit > config.query.max_limit {
        issues.push("query.default_limit must be in [1, query.max_limit]".into());
    }
    if config.query.default_hours <= 0 || config.query.default_hours > config.query.max_hours {
        issues.push("query.default_hours must be in [1, query.max_hours]".into());
    }

    if config.client.update_interval_secs == 0 {
        issues.push("client.update_interval_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load configuration from environment and optional config file.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, then config.toml if present.
    let mut config = AppConfig::default();
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = parse_config(&contents)?;
    }

    // 3. Environment variables win.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<AppConfig, Error> {
    toml::from_str(contents)
        .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))
}

fn apply_env_overrides<F>(config: &mut AppConfig, var: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = var("CRON_SECRET") {
        config.ingest.cron_secret = secret;
    }
    if let Some(key) = var("AMBIENT_APPLICATION_KEY") {
        config.station.application_key = key;
    }
    if let Some(key) = var("AMBIENT_API_KEY") {
        config.station.api_key = key;
    }
    if let Some(path) = var("KITEWATCH_DB_PATH") {
        config.store.db_path = path;
    }
    if let Some(raw) = var("KITEWATCH_SOURCE") {
        config.station.source = raw.parse()?;
    }
    if let Some(url) = var("KITEWATCH_PROXY_URL") {
        config.station.proxy_base_url = url;
    }
    if let Some(bind) = var("KITEWATCH_BIND") {
        config.server.bind = bind;
    }
    if let Some(dir) = var("KITEWATCH_DATA_DIR") {
        config.history.data_dir = dir;
    }
    if let Some(raw) = var("KITEWATCH_DEDUPE") {
        config.ingest.dedupe_on_source_timestamp = parse_bool(&raw);
    }
    Ok(())
}

/// Ambient credentials are only needed when that source is actually used.
pub fn require_station_credentials(config: &AppConfig) -> Result<(), Error> {
    if config.station.source == SourceKind::Ambient
        && (config.station.application_key.trim().is_empty()
            || config.station.api_key.trim().is_empty())
    {
        return Err(Error::Config(
            "AMBIENT_APPLICATION_KEY and AMBIENT_API_KEY are required for the ambient source"
                .into(),
        ));
    }
    Ok(())
}
