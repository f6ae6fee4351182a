//! Ambient Weather REST client (primary station).
//!
//! `GET /v1/devices` returns every device on the account together with its
//! `lastData` snapshot. Wind values arrive in mph.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::http::excerpt;
use common::{mph_to_knots, Error, Measurement, SensorReading, SourceKind};
use serde::Deserialize;
use tracing::debug;

use crate::{build_http_client, MeasurementSource};

/// Ambient Weather client.
#[derive(Debug, Clone)]
pub struct AmbientStationClient {
    client: reqwest::Client,
    base_url: String,
    application_key: String,
    api_key: String,
}

// ── Ambient response types ────────────────────────────────────────────

/// The devices endpoint answers with a bare array; some relays wrap it as
/// `{"data": [...]}` and signal loss of connectivity with `{"offline": true}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DevicesPayload {
    Bare(Vec<Device>),
    Wrapped(WrappedDevices),
}

#[derive(Debug, Deserialize)]
pub struct WrappedDevices {
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub data: Vec<Device>,
}

#[derive(Debug, Deserialize)]
pub struct Device {
    #[serde(rename = "macAddress", default)]
    pub mac_address: Option<String>,
    #[serde(rename = "lastData", default)]
    pub last_data: Option<LastData>,
}

/// Snapshot of the most recent sensor values.
#[derive(Debug, Default, Deserialize)]
pub struct LastData {
    /// Epoch milliseconds.
    #[serde(default)]
    pub dateutc: Option<i64>,
    /// RFC 3339 timestamp, present on newer firmware.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub windspeedmph: Option<f64>,
    #[serde(default)]
    pub windgustmph: Option<f64>,
    #[serde(default)]
    pub maxdailygust: Option<f64>,
    #[serde(default)]
    pub winddir: Option<f64>,
    #[serde(default)]
    pub winddir_avg10m: Option<f64>,
    #[serde(default)]
    pub tempf: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub baromrelin: Option<f64>,
}

// ── Implementation ────────────────────────────────────────────────────

impl AmbientStationClient {
    pub fn new(
        base_url: &str,
        application_key: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, Error> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            application_key: application_key.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn fetch_devices_body(&self) -> Result<String, Error> {
        let url = format!("{}/v1/devices", self.base_url);
        debug!("Fetching Ambient Weather devices: {}", url);

        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("applicationKey", self.application_key.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Ambient Weather request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("Ambient Weather body read failed: {e}")))?;

        if !status.is_success() {
            return Err(Error::Network(format!(
                "Ambient Weather returned {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl MeasurementSource for AmbientStationClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Ambient
    }

    async fn fetch_latest(&self) -> Result<Measurement, Error> {
        let body = self.fetch_devices_body().await?;
        let measurement = parse_devices(&body)?;
        debug!(
            "Ambient reading: {:.1} kn from {:.0}° at {}",
            measurement.wind_speed_knots(),
            measurement.wind_direction_deg(),
            measurement.timestamp()
        );
        Ok(measurement)
    }
}

/// Turn a raw devices payload into a measurement from the first device.
pub fn parse_devices(body: &str) -> Result<Measurement, Error> {
    let payload: DevicesPayload = serde_json::from_str(body)
        .map_err(|e| Error::UpstreamFormat(format!("devices payload: {e}")))?;

    let devices = match payload {
        DevicesPayload::Bare(devices) => devices,
        DevicesPayload::Wrapped(wrapped) if wrapped.offline => {
            return Err(Error::Network("station relay reports offline mode".into()));
        }
        DevicesPayload::Wrapped(wrapped) => wrapped.data,
    };

    let device = devices
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoDevice("no devices found on account".into()))?;

    let last = device.last_data.ok_or_else(|| {
        Error::NoDevice(format!(
            "device {} has no recent data",
            device.mac_address.as_deref().unwrap_or("<unknown>")
        ))
    })?;

    Ok(Measurement::new(reading_from_last_data(&last)?, SourceKind::Ambient.as_str()))
}

fn parse_timestamp(last: &LastData) -> Result<DateTime<Utc>, Error> {
    if let Some(ms) = last.dateutc {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| Error::UpstreamFormat(format!("dateutc out of range: {ms}")));
    }
    if let Some(raw) = last.date.as_deref() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::UpstreamFormat(format!("bad date '{raw}': {e}")));
    }
    Err(Error::UpstreamFormat("lastData has no timestamp".into()))
}

fn reading_from_last_data(last: &LastData) -> Result<SensorReading, Error> {
    let timestamp = parse_timestamp(last)?;
    let speed_mph = last
        .windspeedmph
        .ok_or_else(|| Error::UpstreamFormat("lastData.windspeedmph missing".into()))?;
    let direction = last
        .winddir
        .ok_or_else(|| Error::UpstreamFormat("lastData.winddir missing".into()))?;

    Ok(SensorReading {
        timestamp,
        wind_speed_knots: mph_to_knots(speed_mph),
        wind_gust_knots: last.windgustmph.map(mph_to_knots),
        max_gust_knots: last.maxdailygust.map(mph_to_knots),
        wind_direction_deg: direction,
        wind_direction_avg_deg: last.winddir_avg10m,
        temperature_f: last.tempf,
        humidity_pct: last.humidity,
        pressure_inhg: last.baromrelin,
    })
}
