//! Bounded local measurement history.
//!
//! Records are kept in timestamp order and persisted as one JSON blob under
//! [`HISTORY_KEY`]. Every mutation rewrites the blob. Retention (max age, then
//! max count, oldest first) runs on every append and import.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::config::HistoryConfig;
use common::{Error, Measurement, SafetyLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::blob::BlobStore;

pub const HISTORY_KEY: &str = "kitewatch-history";

/// A retained measurement plus storage metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub stored_at: DateTime<Utc>,
    pub measurement: Measurement,
}

/// Aggregates over a history window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub count: usize,
    pub avg_wind_speed: f64,
    /// Over nonzero speeds only.
    pub min_wind_speed: Option<f64>,
    pub max_wind_speed: f64,
    pub max_gust: f64,
    pub dominant_safety: SafetyLevel,
}

pub const CSV_COLUMNS: [&str; 13] = [
    "timestamp",
    "wind_speed_knots",
    "wind_gust_knots",
    "max_gust_knots",
    "wind_direction",
    "wind_direction_avg",
    "temperature_f",
    "humidity",
    "pressure",
    "safety_level",
    "safety_label",
    "is_offshore",
    "data_source",
];

pub struct HistoryStore {
    blob: Arc<dyn BlobStore>,
    records: Vec<HistoryRecord>,
    max_records: usize,
    max_age: Duration,
}

impl HistoryStore {
    /// Load the persisted history. A missing blob gives an empty store; an
    /// unreadable or corrupt one is logged and also gives an empty store.
    pub fn load(blob: Arc<dyn BlobStore>, max_records: usize, max_age: Duration) -> Self {
        let records = match blob.read(HISTORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<HistoryRecord>>(&raw) {
                Ok(mut records) => {
                    records.sort_by_key(|r| r.measurement.timestamp());
                    records
                }
                Err(e) => {
                    warn!("History blob is corrupt, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read history blob, starting empty: {}", e);
                Vec::new()
            }
        };

        let mut store = Self {
            blob,
            records,
            max_records: max_records.max(1),
            max_age,
        };
        store.apply_retention(Utc::now());
        debug!("Loaded {} history records", store.records.len());
        store
    }

    pub fn from_config(cfg: &HistoryConfig, blob: Arc<dyn BlobStore>) -> Self {
        Self::load(blob, cfg.max_records, Duration::hours(cfg.max_age_hours))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn append(&mut self, measurement: Measurement) -> Result<Option<HistoryRecord>, Error> {
        self.append_at(measurement, Utc::now())
    }

    /// Insert in timestamp order, enforce retention as of `now`, persist.
    /// Returns `None` when retention evicted the new record straight away.
    pub fn append_at(
        &mut self,
        measurement: Measurement,
        now: DateTime<Utc>,
    ) -> Result<Option<HistoryRecord>, Error> {
        let record = HistoryRecord {
            id: Uuid::new_v4(),
            stored_at: now,
            measurement,
        };
        let ts = record.measurement.timestamp();
        let pos = self
            .records
            .partition_point(|r| r.measurement.timestamp() <= ts);
        self.records.insert(pos, record.clone());

        let evicted = self.apply_retention(now);
        if evicted > 0 {
            debug!("History retention evicted {} records", evicted);
        }
        self.persist()?;

        if self.records.iter().any(|r| r.id == record.id) {
            Ok(Some(record))
        } else {
            debug!(
                "Reading at {} is outside retention, not kept",
                record.measurement.timestamp()
            );
            Ok(None)
        }
    }

    fn apply_retention(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let cutoff = now - self.max_age;
        self.records.retain(|r| r.measurement.timestamp() >= cutoff);
        if self.records.len() > self.max_records {
            let excess = self.records.len() - self.max_records;
            self.records.drain(..excess);
        }
        before - self.records.len()
    }

    fn persist(&self) -> Result<(), Error> {
        let raw = serde_json::to_string(&self.records)?;
        self.blob.write(HISTORY_KEY, &raw)
    }

    pub fn query(&self, since_hours: Option<i64>, limit: Option<usize>) -> Vec<HistoryRecord> {
        self.query_at(since_hours, limit, Utc::now())
    }

    /// Records newer than `now - since_hours`, most recent first.
    pub fn query_at(
        &self,
        since_hours: Option<i64>,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<HistoryRecord> {
        let floor = since_hours.map(|h| now - Duration::hours(h));
        self.records
            .iter()
            .rev()
            .filter(|r| floor.map_or(true, |f| r.measurement.timestamp() >= f))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn export_json(&self, since_hours: Option<i64>) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.query(since_hours, None))?)
    }

    /// CSV with a header row and [`CSV_COLUMNS`] order.
    pub fn export_csv(&self, since_hours: Option<i64>) -> String {
        let mut out = CSV_COLUMNS.join(",");
        out.push('\n');
        for record in self.query(since_hours, None) {
            let m = &record.measurement;
            let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
            let fields = [
                m.timestamp().to_rfc3339(),
                m.wind_speed_knots().to_string(),
                opt(m.wind_gust_knots()),
                opt(m.max_gust_knots()),
                m.wind_direction_deg().to_string(),
                m.wind_direction_avg_deg().to_string(),
                opt(m.temperature_f()),
                opt(m.humidity_pct()),
                opt(m.pressure_inhg()),
                m.safety().level.as_str().to_string(),
                m.safety().label.clone(),
                m.safety().is_offshore.to_string(),
                m.source_id().to_string(),
            ];
            let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    /// Merge records from an export. Ids already present are skipped.
    /// Returns how many records were added and survived retention.
    pub fn import_json(&mut self, json: &str) -> Result<usize, Error> {
        self.import_json_at(json, Utc::now())
    }

    pub fn import_json_at(&mut self, json: &str, now: DateTime<Utc>) -> Result<usize, Error> {
        let incoming: Vec<HistoryRecord> = serde_json::from_str(json)?;
        let known: HashSet<Uuid> = self.records.iter().map(|r| r.id).collect();
        let mut added: HashSet<Uuid> = HashSet::new();
        for record in incoming {
            if !known.contains(&record.id) && added.insert(record.id) {
                self.records.push(record);
            }
        }
        self.records.sort_by_key(|r| r.measurement.timestamp());
        self.apply_retention(now);
        self.persist()?;

        Ok(self
            .records
            .iter()
            .filter(|r| added.contains(&r.id))
            .count())
    }

    pub fn stats(&self, since_hours: Option<i64>) -> Option<HistoryStats> {
        self.stats_at(since_hours, Utc::now())
    }

    pub fn stats_at(&self, since_hours: Option<i64>, now: DateTime<Utc>) -> Option<HistoryStats> {
        let window = self.query_at(since_hours, None, now);
        if window.is_empty() {
            return None;
        }

        let speeds: Vec<f64> = window
            .iter()
            .map(|r| r.measurement.wind_speed_knots())
            .collect();
        let count = window.len();
        let avg = speeds.iter().sum::<f64>() / count as f64;
        let max = speeds.iter().copied().fold(0.0, f64::max);
        let min = speeds
            .iter()
            .copied()
            .filter(|s| *s > 0.0)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))));
        let max_gust = window
            .iter()
            .filter_map(|r| r.measurement.wind_gust_knots())
            .fold(0.0, f64::max);

        let mut levels: HashMap<SafetyLevel, usize> = HashMap::new();
        for r in &window {
            *levels.entry(r.measurement.safety().level).or_default() += 1;
        }
        // max_by_key keeps the last maximum, so ties go to the more cautious level.
        let dominant_safety = [SafetyLevel::Safe, SafetyLevel::Caution, SafetyLevel::Danger]
            .into_iter()
            .max_by_key(|l| levels.get(l).copied().unwrap_or(0))
            .unwrap_or(SafetyLevel::Caution);

        Some(HistoryStats {
            count,
            avg_wind_speed: round2(avg),
            min_wind_speed: min.map(round2),
            max_wind_speed: round2(max),
            max_gust: round2(max_gust),
            dominant_safety,
        })
    }

    /// Drop every record. Irreversible.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.records.clear();
        self.persist()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use common::SensorReading;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn measurement(minutes_ago: i64, speed: f64, dir: f64) -> Measurement {
        Measurement::new(
            SensorReading {
                timestamp: now() - Duration::minutes(minutes_ago),
                wind_speed_knots: speed,
                wind_gust_knots: Some(speed + 4.0),
                max_gust_knots: None,
                wind_direction_deg: dir,
                wind_direction_avg_deg: None,
                temperature_f: Some(84.0),
                humidity_pct: Some(70.0),
                pressure_inhg: None,
            },
            "ambient_weather",
        )
    }

    fn store(max_records: usize) -> (Arc<MemoryBlobStore>, HistoryStore) {
        let blob = Arc::new(MemoryBlobStore::new());
        let store = HistoryStore::load(blob.clone(), max_records, Duration::hours(24));
        (blob, store)
    }

    #[test]
    fn test_append_beyond_capacity_evicts_oldest() {
        let (_, mut h) = store(3);
        for i in 0..3 {
            h.append_at(measurement(40 - i * 10, 10.0 + i as f64, 90.0), now())
                .unwrap();
        }
        let oldest = h.records()[0].id;

        h.append_at(measurement(5, 20.0, 90.0), now()).unwrap();
        assert_eq!(h.len(), 3);
        assert!(h.records().iter().all(|r| r.id != oldest));
        assert_eq!(h.records()[0].measurement.wind_speed_knots(), 11.0);
    }

    #[test]
    fn test_append_drops_records_past_max_age() {
        let (_, mut h) = store(100);
        h.append_at(measurement(25 * 60, 10.0, 90.0), now()).unwrap();
        h.append_at(measurement(60, 12.0, 90.0), now()).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.records()[0].measurement.wind_speed_knots(), 12.0);
    }

    #[test]
    fn test_query_recent_first_within_window() {
        let (_, mut h) = store(100);
        for (ago, speed) in [(90, 9.0), (50, 10.0), (10, 11.0), (30, 12.0)] {
            h.append_at(measurement(ago, speed, 90.0), now()).unwrap();
        }

        let last_hour = h.query_at(Some(1), None, now());
        let speeds: Vec<f64> = last_hour
            .iter()
            .map(|r| r.measurement.wind_speed_knots())
            .collect();
        assert_eq!(speeds, vec![11.0, 12.0, 10.0]);

        assert_eq!(h.query_at(None, Some(2), now()).len(), 2);
    }

    #[test]
    fn test_persist_and_reload() {
        let (blob, mut h) = store(100);
        h.append(measurement(0, 14.0, 90.0)).unwrap();

        let reloaded = HistoryStore::load(blob, 100, Duration::hours(24));
        assert_eq!(reloaded.records(), h.records());
    }

    #[test]
    fn test_corrupt_blob_loads_empty() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.write(HISTORY_KEY, "{not json").unwrap();
        let h = HistoryStore::load(blob, 10, Duration::hours(24));
        assert!(h.is_empty());
    }

    #[test]
    fn test_export_then_import_reproduces_records() {
        let (_, mut h) = store(100);
        for ago in [0, 5, 10] {
            h.append(measurement(ago, 15.0, 90.0)).unwrap();
        }
        let exported = h.export_json(None).unwrap();

        let (_, mut fresh) = store(100);
        assert_eq!(fresh.import_json(&exported).unwrap(), 3);
        assert_eq!(fresh.records(), h.records());

        // Importing again adds nothing.
        assert_eq!(fresh.import_json(&exported).unwrap(), 0);
        assert_eq!(fresh.len(), 3);
    }

    #[test]
    fn test_append_outside_retention_reports_not_kept() {
        let (_, mut h) = store(100);
        assert!(h
            .append_at(measurement(25 * 60, 10.0, 90.0), now())
            .unwrap()
            .is_none());
        assert!(h.is_empty());

        let kept = h.append_at(measurement(5, 12.0, 90.0), now()).unwrap();
        assert_eq!(kept.map(|r| r.id), Some(h.records()[0].id));
    }

    #[test]
    fn test_import_reclassifies_and_normalizes() {
        let ts = (now() - Duration::minutes(5)).to_rfc3339();
        let json = format!(
            r##"[{{
                "id": "6f1c2a9e-3b1d-4c55-9a0e-2f7d8b6c1a10",
                "stored_at": "{ts}",
                "measurement": {{
                    "timestamp": "{ts}",
                    "wind_speed_knots": -7.0,
                    "wind_gust_knots": null,
                    "max_gust_knots": null,
                    "wind_direction_deg": 720.0,
                    "wind_direction_avg_deg": 270.0,
                    "temperature_f": null,
                    "humidity_pct": -40.0,
                    "pressure_inhg": null,
                    "source_id": "ambient_weather",
                    "safety": {{
                        "level": "safe",
                        "label": "Safe - Onshore",
                        "color": "#10b981",
                        "is_offshore": false,
                        "is_onshore": true
                    }}
                }}
            }}]"##
        );

        let (_, mut h) = store(10);
        assert_eq!(h.import_json(&json).unwrap(), 1);
        let m = &h.records()[0].measurement;
        assert_eq!(m.wind_speed_knots(), 0.0);
        assert_eq!(m.wind_direction_deg(), 0.0);
        assert_eq!(m.humidity_pct(), Some(0.0));
        assert_eq!(m.safety().level, SafetyLevel::Danger);
        assert!(m.safety().is_offshore);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let (_, mut h) = store(10);
        assert!(matches!(
            h.import_json("[{\"id\": 1}]"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_csv_export_columns_and_quoting() {
        let (_, mut h) = store(10);
        let m = Measurement::new(
            SensorReading {
                timestamp: Utc::now(),
                wind_speed_knots: 15.0,
                wind_gust_knots: None,
                max_gust_knots: None,
                wind_direction_deg: 90.0,
                wind_direction_avg_deg: None,
                temperature_f: None,
                humidity_pct: None,
                pressure_inhg: None,
            },
            "relay, \"beach\"",
        );
        h.append(m).unwrap();

        let csv = h.export_csv(None);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.ends_with(",safe,Safe - Onshore,false,\"relay, \"\"beach\"\"\""));
        assert!(row.contains(",15,,,90,90,,,,"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_stats_over_window() {
        let (_, mut h) = store(100);
        h.append_at(measurement(10, 0.0, 90.0), now()).unwrap();
        h.append_at(measurement(20, 12.5, 90.0), now()).unwrap();
        h.append_at(measurement(30, 20.0, 270.0), now()).unwrap();
        h.append_at(measurement(40, 15.0, 90.0), now()).unwrap();

        let s = h.stats_at(Some(1), now()).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.avg_wind_speed, 11.88);
        assert_eq!(s.min_wind_speed, Some(12.5));
        assert_eq!(s.max_wind_speed, 20.0);
        assert_eq!(s.max_gust, 24.0);
        assert_eq!(s.dominant_safety, SafetyLevel::Safe);

        assert!(h.stats_at(Some(1), now() + Duration::hours(3)).is_none());
    }

    #[test]
    fn test_clear_empties_and_persists() {
        let (blob, mut h) = store(10);
        h.append(measurement(0, 10.0, 90.0)).unwrap();
        h.clear().unwrap();
        assert!(h.is_empty());
        assert_eq!(blob.read(HISTORY_KEY).unwrap().as_deref(), Some("[]"));
    }
}
