//! Secondary station reached through a wind-history relay.
//!
//! The relay answers `GET /api/wind-history?limit=N&hours=H` with its newest
//! stored row under `latest`, the window under `history`, and aggregates under
//! `stats` and `meta`. Values are already in knots, but numeric columns may
//! arrive as strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::http::excerpt;
use common::{Error, Measurement, SensorReading, SourceKind};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::{build_http_client, MeasurementSource};

#[derive(Debug, Clone)]
pub struct ProxiedStationClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Relay response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LatestResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub latest: Option<RelayRow>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Full window answer from the relay's history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub history: Vec<RelayRow>,
    #[serde(default)]
    pub stats: Option<RelayStats>,
    #[serde(default)]
    pub meta: Option<RelayMeta>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Window aggregates as computed by the relay. `None` when the window is empty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub count: usize,
    pub avg_wind_speed: f64,
    pub max_gust: f64,
    #[serde(default)]
    pub min_wind_speed: Option<f64>,
    pub max_wind_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMeta {
    pub count: usize,
    pub hours: i64,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

/// Relay history converted to canonical measurements, newest first.
#[derive(Debug, Clone)]
pub struct RemoteHistory {
    pub measurements: Vec<Measurement>,
    /// Rows that could not be turned into a measurement.
    pub skipped: usize,
    pub stats: Option<RelayStats>,
    pub meta: Option<RelayMeta>,
}

#[derive(Debug, Deserialize)]
pub struct RelayRow {
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub wind_speed_knots: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub wind_gust_knots: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_gust_knots: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub wind_direction: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub wind_direction_avg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature_f: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

/// Accept `12.5`, `"12.5"` or `null`. Unparseable strings count as absent.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<NumberOrString>::deserialize(deserializer)? {
            Some(NumberOrString::Number(n)) => Some(n),
            Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

// ── Implementation ────────────────────────────────────────────────────

impl ProxiedStationClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, Error> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the relay's stored window. The relay clamps `hours` and `limit`.
    pub async fn fetch_history(&self, hours: u32, limit: u32) -> Result<RemoteHistory, Error> {
        let body = self.get_history_body(hours, limit).await?;
        parse_history(&body)
    }

    async fn get_history_body(&self, hours: u32, limit: u32) -> Result<String, Error> {
        let url = format!("{}/api/wind-history", self.base_url);
        debug!("Fetching relay history: {} hours={} limit={}", url, hours, limit);

        let resp = self
            .client
            .get(&url)
            .query(&[("limit", limit), ("hours", hours)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("relay request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("relay body read failed: {e}")))?;

        if !status.is_success() {
            return Err(Error::Network(format!(
                "relay returned {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl MeasurementSource for ProxiedStationClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Proxied
    }

    async fn fetch_latest(&self) -> Result<Measurement, Error> {
        let body = self.get_history_body(1, 1).await?;
        parse_latest(&body)
    }
}

/// Turn a relay response into a measurement. Safety is recomputed locally
/// rather than trusted from the relay.
pub fn parse_latest(body: &str) -> Result<Measurement, Error> {
    let resp: LatestResponse = serde_json::from_str(body)
        .map_err(|e| Error::UpstreamFormat(format!("relay payload: {e}")))?;

    if !resp.success {
        return Err(Error::UpstreamFormat(format!(
            "relay reported failure: {}",
            resp.error.as_deref().unwrap_or("no reason given")
        )));
    }

    resp.latest
        .ok_or_else(|| Error::NoDevice("relay has no recent measurement".into()))?
        .into_measurement()
}

/// Turn a relay history window into measurements. Rows missing a timestamp,
/// speed or direction are skipped and counted.
pub fn parse_history(body: &str) -> Result<RemoteHistory, Error> {
    let resp: HistoryResponse = serde_json::from_str(body)
        .map_err(|e| Error::UpstreamFormat(format!("relay payload: {e}")))?;

    if !resp.success {
        return Err(Error::UpstreamFormat(format!(
            "relay reported failure: {}",
            resp.error.as_deref().unwrap_or("no reason given")
        )));
    }

    let mut measurements = Vec::with_capacity(resp.history.len());
    let mut skipped = 0;
    for row in resp.history {
        match row.into_measurement() {
            Ok(m) => measurements.push(m),
            Err(e) => {
                warn!("Skipping relay history row: {}", e);
                skipped += 1;
            }
        }
    }

    Ok(RemoteHistory {
        measurements,
        skipped,
        stats: resp.stats,
        meta: resp.meta,
    })
}

impl RelayRow {
    pub fn into_measurement(self) -> Result<Measurement, Error> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                Error::UpstreamFormat(format!("bad timestamp '{}': {e}", self.timestamp))
            })?;

        let speed = self
            .wind_speed_knots
            .ok_or_else(|| Error::UpstreamFormat("wind_speed_knots missing".into()))?;
        let direction = self
            .wind_direction
            .ok_or_else(|| Error::UpstreamFormat("wind_direction missing".into()))?;

        let reading = SensorReading {
            timestamp,
            wind_speed_knots: speed,
            wind_gust_knots: self.wind_gust_knots,
            max_gust_knots: self.max_gust_knots,
            wind_direction_deg: direction,
            wind_direction_avg_deg: self.wind_direction_avg,
            temperature_f: self.temperature_f,
            humidity_pct: self.humidity,
            pressure_inhg: self.pressure,
        };

        Ok(Measurement::new(reading, SourceKind::Proxied.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SafetyLevel;

    #[test]
    fn test_parse_latest_row() {
        let body = r#"{
            "success": true,
            "latest": {
                "id": 42,
                "timestamp": "2026-03-01T10:00:00+00:00",
                "wind_speed_knots": "15.4",
                "wind_gust_knots": 19.1,
                "max_gust_knots": null,
                "wind_direction": 100,
                "wind_direction_avg": 95,
                "temperature_f": 84.0,
                "humidity": 68,
                "pressure": 29.9,
                "safety_level": "danger",
                "data_source": "ambient_weather"
            },
            "history": []
        }"#;

        let m = parse_latest(body).expect("relay row should parse");
        assert_eq!(m.wind_speed_knots(), 15.4);
        assert_eq!(m.wind_gust_knots(), Some(19.1));
        assert_eq!(m.max_gust_knots(), None);
        assert_eq!(m.wind_direction_avg_deg(), 95.0);
        assert_eq!(m.source_id(), "proxied_station");
        // The relay's own verdict is ignored.
        assert_eq!(m.safety().level, SafetyLevel::Safe);
    }

    #[test]
    fn test_null_latest_is_no_device() {
        let body = r#"{"success": true, "latest": null, "history": [], "stats": null}"#;
        assert!(matches!(parse_latest(body), Err(Error::NoDevice(_))));
    }

    #[test]
    fn test_relay_failure_is_format_error() {
        let body = r#"{"success": false, "error": "database offline"}"#;
        let err = parse_latest(body).unwrap_err();
        assert!(matches!(err, Error::UpstreamFormat(ref msg) if msg.contains("database offline")));
    }

    #[test]
    fn test_parse_history_window() {
        let body = r#"{
            "success": true,
            "latest": {"timestamp": "2026-03-01T10:20:00.000Z", "wind_speed_knots": 18, "wind_direction": 270},
            "history": [
                {"id": 3, "timestamp": "2026-03-01T10:20:00.000Z", "wind_speed_knots": 18,
                 "wind_gust_knots": "24.5", "wind_direction": 270, "wind_direction_avg": 265,
                 "safety_level": "safe", "data_source": "ambient_weather"},
                {"id": 2, "timestamp": "2026-03-01T10:10:00.000Z", "wind_speed_knots": "n/a",
                 "wind_direction": 90},
                {"id": 1, "timestamp": "2026-03-01T10:00:00.000Z", "wind_speed_knots": 0,
                 "wind_gust_knots": null, "wind_direction": 90, "wind_direction_avg": 90}
            ],
            "stats": {"count": 3, "avgWindSpeed": 9.0, "maxGust": 24.5,
                      "minWindSpeed": 18.0, "maxWindSpeed": 18.0},
            "meta": {"count": 3, "hours": 6,
                     "timeRange": {"from": "2026-03-01T04:30:00.000Z", "to": "2026-03-01T10:30:00.000Z"}}
        }"#;

        let remote = parse_history(body).expect("history should parse");
        assert_eq!(remote.measurements.len(), 2);
        assert_eq!(remote.skipped, 1);

        let newest = &remote.measurements[0];
        assert_eq!(newest.wind_gust_knots(), Some(24.5));
        assert!(newest.safety().is_offshore);
        assert_eq!(newest.safety().level, SafetyLevel::Danger);
        assert_eq!(remote.measurements[1].wind_speed_knots(), 0.0);

        let stats = remote.stats.expect("stats present");
        assert_eq!(stats.max_gust, 24.5);
        assert_eq!(stats.min_wind_speed, Some(18.0));
        let meta = remote.meta.expect("meta present");
        assert_eq!(meta.hours, 6);
        assert_eq!(
            meta.time_range.map(|r| r.to),
            Some("2026-03-01T10:30:00.000Z".to_string())
        );
    }

    #[test]
    fn test_parse_history_empty_window() {
        let body = r#"{"success": true, "latest": null, "history": [], "stats": null,
            "meta": {"count": 0, "hours": 24, "timeRange": {"from": "a", "to": "b"}}}"#;
        let remote = parse_history(body).unwrap();
        assert!(remote.measurements.is_empty());
        assert!(remote.stats.is_none());
        assert_eq!(remote.meta.map(|m| m.count), Some(0));
    }

    #[test]
    fn test_missing_direction_is_format_error() {
        let body = r#"{"success": true, "latest": {
            "timestamp": "2026-03-01T10:00:00Z",
            "wind_speed_knots": 12
        }}"#;
        assert!(matches!(parse_latest(body), Err(Error::UpstreamFormat(_))));
    }
}
