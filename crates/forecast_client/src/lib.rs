//! Open-Meteo hourly wind forecast client.
//!
//! Requests `wind_speed_10m`, `wind_direction_10m` and `wind_gusts_10m` for
//! a location and converts them into [`ForecastPoint`]s in knots, keeping
//! only the configured hours of each day.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use common::{http, kmh_to_knots, Error, ForecastPoint, Location};
use serde::Deserialize;
use tracing::{debug, warn};

/// Anything that can produce an hourly wind forecast.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(
        &self,
        location: &Location,
        horizon_days: u32,
    ) -> Result<Vec<ForecastPoint>, Error>;
}

/// Open-Meteo client.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
    window: HourWindow,
}

/// Which hours of each forecast day are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    /// First hour kept, inclusive.
    pub start_hour: u32,
    /// Last hour kept, inclusive.
    pub end_hour: u32,
    pub step: u32,
}

impl Default for HourWindow {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 19,
            step: 1,
        }
    }
}

/// Response from the forecast endpoint.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub hourly: Option<HourlyData>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parallel hourly arrays, km/h and degrees. Open-Meteo fills gaps with null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyData {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_direction_10m: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_gusts_10m: Vec<Option<f64>>,
}

impl OpenMeteoClient {
    pub fn new(base_url: &str, window: HourWindow, timeout_secs: u64) -> Result<Self, Error> {
        let client = http::build_client(timeout_secs)
            .map_err(|e| Error::ForecastUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            window,
        })
    }

    pub fn window(&self) -> HourWindow {
        self.window
    }

    /// Fetch raw hourly arrays for `horizon_days` days.
    pub async fn fetch_hourly(
        &self,
        location: &Location,
        horizon_days: u32,
    ) -> Result<HourlyData, Error> {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            (
                "hourly",
                "wind_speed_10m,wind_direction_10m,wind_gusts_10m".to_string(),
            ),
            ("timezone", location.timezone.clone()),
            ("forecast_days", horizon_days.to_string()),
        ];

        debug!(
            "Fetching Open-Meteo forecast: {} lat={} lon={} days={}",
            self.base_url, location.latitude, location.longitude, horizon_days
        );

        let resp = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::ForecastUnavailable(format!("HTTP error: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::ForecastUnavailable(format!(
                "Open-Meteo returned {}: {}",
                status,
                http::excerpt(&body)
            )));
        }

        let payload: ForecastResponse = resp
            .json()
            .await
            .map_err(|e| Error::ForecastUnavailable(format!("JSON parse error: {e}")))?;

        payload.hourly.ok_or_else(|| {
            Error::ForecastUnavailable(
                payload
                    .reason
                    .unwrap_or_else(|| "response has no hourly block".into()),
            )
        })
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    /// Fetch and filter the forecast for `location`.
    async fn fetch_forecast(
        &self,
        location: &Location,
        horizon_days: u32,
    ) -> Result<Vec<ForecastPoint>, Error> {
        let hourly = self.fetch_hourly(location, horizon_days).await?;
        let points = process_hourly(&hourly, horizon_days, self.window);
        if points.is_empty() {
            return Err(Error::ForecastUnavailable(
                "no usable hours in forecast window".into(),
            ));
        }
        debug!("Open-Meteo forecast: {} points", points.len());
        Ok(points)
    }
}

/// Pick the windowed hours out of the hourly arrays.
///
/// Index is `day * 24 + hour`. Indices past the returned arrays are skipped,
/// as are hours with a null or unparseable value.
pub fn process_hourly(hourly: &HourlyData, days: u32, window: HourWindow) -> Vec<ForecastPoint> {
    let step = window.step.max(1) as usize;
    let end_hour = window.end_hour.min(23);
    let mut points = Vec::new();

    for day in 0..days as usize {
        for hour in (window.start_hour..=end_hour).step_by(step) {
            let idx = day * 24 + hour as usize;
            if idx >= hourly.time.len() {
                continue;
            }

            let value = |arr: &[Option<f64>]| arr.get(idx).copied().flatten();
            let (Some(speed), Some(direction), Some(gust)) = (
                value(&hourly.wind_speed_10m),
                value(&hourly.wind_direction_10m),
                value(&hourly.wind_gusts_10m),
            ) else {
                continue;
            };

            let Ok(time) = NaiveDateTime::parse_from_str(&hourly.time[idx], "%Y-%m-%dT%H:%M")
            else {
                warn!("Skipping forecast hour with bad time '{}'", hourly.time[idx]);
                continue;
            };

            points.push(ForecastPoint {
                date: time.date(),
                hour_of_day: hour,
                speed_knots: kmh_to_knots(speed),
                direction_deg: direction,
                gust_knots: kmh_to_knots(gust),
            });
        }
    }

    points
}
