//! Durable measurement store backed by SQLite.
//!
//! Ingestion and query are independent invocations: each call opens its own
//! connection on a blocking thread and shares nothing else in process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{Error, Measurement};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS wind_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    wind_speed_knots REAL NOT NULL,
    wind_gust_knots REAL,
    max_gust_knots REAL,
    wind_direction REAL NOT NULL,
    wind_direction_avg REAL NOT NULL,
    temperature_f REAL,
    humidity REAL,
    pressure REAL,
    safety_level TEXT NOT NULL,
    safety_text TEXT NOT NULL,
    safety_color TEXT NOT NULL,
    is_offshore INTEGER NOT NULL,
    is_onshore INTEGER NOT NULL,
    data_source TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wind_measurements_timestamp
    ON wind_measurements(timestamp DESC);
";

const COLUMNS: &str = "id, timestamp, wind_speed_knots, wind_gust_knots, max_gust_knots, \
     wind_direction, wind_direction_avg, temperature_f, humidity, pressure, \
     safety_level, safety_text, safety_color, is_offshore, is_onshore, data_source";

/// One stored row, serialized with the column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindRow {
    pub id: i64,
    pub timestamp: String,
    pub wind_speed_knots: f64,
    pub wind_gust_knots: Option<f64>,
    pub max_gust_knots: Option<f64>,
    pub wind_direction: f64,
    pub wind_direction_avg: f64,
    pub temperature_f: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub safety_level: String,
    pub safety_text: String,
    pub safety_color: String,
    pub is_offshore: bool,
    pub is_onshore: bool,
    pub data_source: String,
}

impl WindRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            wind_speed_knots: row.get(2)?,
            wind_gust_knots: row.get(3)?,
            max_gust_knots: row.get(4)?,
            wind_direction: row.get(5)?,
            wind_direction_avg: row.get(6)?,
            temperature_f: row.get(7)?,
            humidity: row.get(8)?,
            pressure: row.get(9)?,
            safety_level: row.get(10)?,
            safety_text: row.get(11)?,
            safety_color: row.get(12)?,
            is_offshore: row.get(13)?,
            is_onshore: row.get(14)?,
            data_source: row.get(15)?,
        })
    }
}

/// Fixed-width UTC text so lexical order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Durable storage used by the ingestion and query endpoints.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Write one row and return it with its assigned id.
    async fn insert(&self, measurement: &Measurement) -> Result<WindRow, Error>;

    /// Existing row for the same source reading, if any.
    async fn find_by_timestamp_source(
        &self,
        timestamp: DateTime<Utc>,
        data_source: &str,
    ) -> Result<Option<WindRow>, Error>;

    /// Rows at or after `floor`, newest first, at most `limit`.
    async fn query_since(&self, floor: DateTime<Utc>, limit: u32) -> Result<Vec<WindRow>, Error>;
}

/// SQLite file store. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct SqliteWindStore {
    db_path: PathBuf,
}

impl SqliteWindStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create the database file, parent directory and schema.
    pub async fn init(&self) -> Result<(), Error> {
        self.with_connection(|_| Ok(())).await
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&path)?;
            work(&conn).map_err(|e| Error::Store(e.to_string()))
        })
        .await
        .map_err(|e| Error::Store(format!("store task failed: {e}")))?
    }
}

fn open(path: &Path) -> Result<Connection, Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Store(format!(
                "failed to create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    let conn = Connection::open(path)
        .map_err(|e| Error::Store(format!("open {}: {e}", path.display())))?;
    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::Store(format!("schema: {e}")))?;
    Ok(conn)
}

#[async_trait]
impl MeasurementStore for SqliteWindStore {
    async fn insert(&self, measurement: &Measurement) -> Result<WindRow, Error> {
        let m = measurement.clone();
        let row = self
            .with_connection(move |conn| {
                let safety = m.safety();
                let timestamp = format_timestamp(m.timestamp());
                conn.execute(
                    "INSERT INTO wind_measurements
                     (timestamp, wind_speed_knots, wind_gust_knots, max_gust_knots,
                      wind_direction, wind_direction_avg, temperature_f, humidity, pressure,
                      safety_level, safety_text, safety_color, is_offshore, is_onshore, data_source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        timestamp,
                        m.wind_speed_knots(),
                        m.wind_gust_knots(),
                        m.max_gust_knots(),
                        m.wind_direction_deg(),
                        m.wind_direction_avg_deg(),
                        m.temperature_f(),
                        m.humidity_pct(),
                        m.pressure_inhg(),
                        safety.level.as_str(),
                        safety.label,
                        safety.color,
                        safety.is_offshore,
                        safety.is_onshore,
                        m.source_id(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM wind_measurements WHERE id = ?1"),
                    params![id],
                    WindRow::from_row,
                )
            })
            .await?;
        debug!("Stored measurement row {} at {}", row.id, row.timestamp);
        Ok(row)
    }

    async fn find_by_timestamp_source(
        &self,
        timestamp: DateTime<Utc>,
        data_source: &str,
    ) -> Result<Option<WindRow>, Error> {
        let ts = format_timestamp(timestamp);
        let source = data_source.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM wind_measurements
                     WHERE timestamp = ?1 AND data_source = ?2
                     ORDER BY id LIMIT 1"
                ),
                params![ts, source],
                WindRow::from_row,
            )
            .optional()
        })
        .await
    }

    async fn query_since(&self, floor: DateTime<Utc>, limit: u32) -> Result<Vec<WindRow>, Error> {
        let floor = format_timestamp(floor);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM wind_measurements
                 WHERE timestamp >= ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![floor, limit], WindRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
