//! Persisted display preferences.
//!
//! Stored as a JSON blob. Missing keys fall back to defaults when loading so
//! blobs written by older versions keep working.

use std::sync::Arc;

use common::config::ClientConfig;
use common::{Error, SpeedUnit, TemperatureUnit};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::blob::BlobStore;

pub const SETTINGS_KEY: &str = "kitewatch-settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub speed_unit: SpeedUnit,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Readings below this are shown as "not rideable".
    #[serde(default = "default_min_wind_speed")]
    pub min_wind_speed_knots: f64,
}

fn default_update_interval() -> u64 {
    30
}
fn default_min_wind_speed() -> f64 {
    12.0
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            speed_unit: SpeedUnit::default(),
            temperature_unit: TemperatureUnit::default(),
            update_interval_secs: default_update_interval(),
            min_wind_speed_knots: default_min_wind_speed(),
        }
    }
}

impl DisplaySettings {
    /// Format a knots value in the chosen unit, one decimal.
    pub fn format_speed(&self, knots: f64) -> String {
        format!(
            "{:.1} {}",
            self.speed_unit.from_knots(knots),
            self.speed_unit.short_label()
        )
    }

    pub fn format_temperature(&self, fahrenheit: f64) -> String {
        format!(
            "{:.1}{}",
            self.temperature_unit.from_fahrenheit(fahrenheit),
            self.temperature_unit.symbol()
        )
    }
}

/// Settings holder. Every change is persisted and broadcast on a watch
/// channel.
pub struct SettingsStore {
    blob: Arc<dyn BlobStore>,
    defaults: DisplaySettings,
    tx: watch::Sender<DisplaySettings>,
}

impl SettingsStore {
    pub fn load(blob: Arc<dyn BlobStore>) -> Self {
        Self::with_defaults(blob, DisplaySettings::default())
    }

    /// Load with the refresh interval seeded from the client config.
    pub fn from_config(cfg: &ClientConfig, blob: Arc<dyn BlobStore>) -> Self {
        let defaults = DisplaySettings {
            update_interval_secs: cfg.update_interval_secs.max(1),
            ..DisplaySettings::default()
        };
        Self::with_defaults(blob, defaults)
    }

    /// Keys missing from the persisted blob take their value from `defaults`,
    /// which is also what [`reset`](Self::reset) restores.
    pub fn with_defaults(blob: Arc<dyn BlobStore>, defaults: DisplaySettings) -> Self {
        let settings = match blob.read(SETTINGS_KEY) {
            Ok(Some(raw)) => merge_onto(&defaults, &raw).unwrap_or_else(|e| {
                warn!("Settings blob is corrupt, using defaults: {}", e);
                defaults.clone()
            }),
            Ok(None) => defaults.clone(),
            Err(e) => {
                warn!("Failed to read settings blob, using defaults: {}", e);
                defaults.clone()
            }
        };
        let (tx, _) = watch::channel(settings);
        Self { blob, defaults, tx }
    }

    pub fn get(&self) -> DisplaySettings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySettings> {
        self.tx.subscribe()
    }

    /// Apply `change`, persist and notify subscribers.
    pub fn update<F>(&self, change: F) -> Result<DisplaySettings, Error>
    where
        F: FnOnce(&mut DisplaySettings),
    {
        let mut next = self.get();
        change(&mut next);
        self.blob
            .write(SETTINGS_KEY, &serde_json::to_string(&next)?)?;
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    pub fn reset(&self) -> Result<DisplaySettings, Error> {
        let defaults = self.defaults.clone();
        self.update(|s| *s = defaults)
    }
}

fn merge_onto(defaults: &DisplaySettings, raw: &str) -> Result<DisplaySettings, Error> {
    let mut merged = serde_json::to_value(defaults)?;
    let stored: serde_json::Value = serde_json::from_str(raw)?;
    match (merged.as_object_mut(), stored) {
        (Some(base), serde_json::Value::Object(fields)) => base.extend(fields),
        _ => {
            return Err(Error::Serialization(
                "settings blob is not an object".into(),
            ))
        }
    }
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    #[test]
    fn test_partial_blob_merges_defaults() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.write(SETTINGS_KEY, r#"{"speed_unit": "kilometers_per_hour"}"#)
            .unwrap();

        let store = SettingsStore::load(blob);
        let s = store.get();
        assert_eq!(s.speed_unit, SpeedUnit::KilometersPerHour);
        assert_eq!(s.update_interval_secs, 30);
        assert_eq!(s.temperature_unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn test_corrupt_blob_uses_defaults() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.write(SETTINGS_KEY, "nope").unwrap();
        assert_eq!(SettingsStore::load(blob).get(), DisplaySettings::default());
    }

    #[test]
    fn test_update_persists_and_notifies() {
        let blob = Arc::new(MemoryBlobStore::new());
        let store = SettingsStore::load(blob.clone());
        let mut rx = store.subscribe();

        store
            .update(|s| s.temperature_unit = TemperatureUnit::Celsius)
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().temperature_unit,
            TemperatureUnit::Celsius
        );

        let reloaded = SettingsStore::load(blob);
        assert_eq!(reloaded.get().temperature_unit, TemperatureUnit::Celsius);

        reloaded.reset().unwrap();
        assert_eq!(reloaded.get(), DisplaySettings::default());
    }

    #[test]
    fn test_config_seeds_interval_default() {
        let cfg = ClientConfig {
            update_interval_secs: 90,
            ..ClientConfig::default()
        };
        let blob = Arc::new(MemoryBlobStore::new());
        let store = SettingsStore::from_config(&cfg, blob.clone());
        assert_eq!(store.get().update_interval_secs, 90);

        blob.write(SETTINGS_KEY, r#"{"min_wind_speed_knots": 15.0}"#)
            .unwrap();
        let store = SettingsStore::from_config(&cfg, blob);
        assert_eq!(store.get().update_interval_secs, 90);
        assert_eq!(store.get().min_wind_speed_knots, 15.0);

        store.update(|s| s.update_interval_secs = 10).unwrap();
        assert_eq!(store.reset().unwrap().update_interval_secs, 90);
    }

    #[test]
    fn test_formatting_uses_units() {
        let s = DisplaySettings {
            speed_unit: SpeedUnit::KilometersPerHour,
            temperature_unit: TemperatureUnit::Celsius,
            ..DisplaySettings::default()
        };
        assert_eq!(s.format_speed(10.0), "18.5 km/h");
        assert_eq!(s.format_temperature(212.0), "100.0°C");
    }
}
