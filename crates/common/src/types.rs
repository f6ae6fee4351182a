//! Domain types shared across the pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::safety::{classify, normalize_direction, SafetyVerdict};

// ── Sources ───────────────────────────────────────────────────────────

/// Which upstream station feeds the pipeline. Chosen explicitly by the
/// caller; never auto-detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Ambient Weather station reached directly.
    #[default]
    Ambient,
    /// Secondary station relayed through a wind-history proxy.
    Proxied,
}

impl SourceKind {
    /// Identifier stored in `data_source` and `Measurement::source_id`.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Ambient => "ambient_weather",
            SourceKind::Proxied => "proxied_station",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ambient" | "ambient_weather" => Ok(SourceKind::Ambient),
            "proxied" | "proxied_station" | "proxy" => Ok(SourceKind::Proxied),
            other => Err(crate::Error::Config(format!("unknown source: {other}"))),
        }
    }
}

// ── Measurements ──────────────────────────────────────────────────────

/// Raw, already unit-converted values produced by an adapter before they
/// become an immutable [`Measurement`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub wind_speed_knots: f64,
    pub wind_gust_knots: Option<f64>,
    pub max_gust_knots: Option<f64>,
    pub wind_direction_deg: f64,
    /// 10-minute average direction; falls back to the instant direction.
    pub wind_direction_avg_deg: Option<f64>,
    pub temperature_f: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_inhg: Option<f64>,
}

/// Canonical wind measurement. Fields are private; the only way in is
/// [`Measurement::new`], which normalizes values and attaches the verdict.
/// Deserializing goes through the same constructor, so a persisted verdict
/// is never trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredMeasurement")]
pub struct Measurement {
    timestamp: DateTime<Utc>,
    wind_speed_knots: f64,
    wind_gust_knots: Option<f64>,
    max_gust_knots: Option<f64>,
    wind_direction_deg: f64,
    wind_direction_avg_deg: f64,
    temperature_f: Option<f64>,
    humidity_pct: Option<f64>,
    pressure_inhg: Option<f64>,
    source_id: String,
    safety: SafetyVerdict,
}

/// Serialized form of [`Measurement`]. Any `safety` field is ignored.
#[derive(Deserialize)]
struct StoredMeasurement {
    timestamp: DateTime<Utc>,
    wind_speed_knots: f64,
    #[serde(default)]
    wind_gust_knots: Option<f64>,
    #[serde(default)]
    max_gust_knots: Option<f64>,
    wind_direction_deg: f64,
    #[serde(default)]
    wind_direction_avg_deg: Option<f64>,
    #[serde(default)]
    temperature_f: Option<f64>,
    #[serde(default)]
    humidity_pct: Option<f64>,
    #[serde(default)]
    pressure_inhg: Option<f64>,
    source_id: String,
}

impl From<StoredMeasurement> for Measurement {
    fn from(raw: StoredMeasurement) -> Self {
        Measurement::new(
            SensorReading {
                timestamp: raw.timestamp,
                wind_speed_knots: raw.wind_speed_knots,
                wind_gust_knots: raw.wind_gust_knots,
                max_gust_knots: raw.max_gust_knots,
                wind_direction_deg: raw.wind_direction_deg,
                wind_direction_avg_deg: raw.wind_direction_avg_deg,
                temperature_f: raw.temperature_f,
                humidity_pct: raw.humidity_pct,
                pressure_inhg: raw.pressure_inhg,
            },
            raw.source_id,
        )
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn non_negative_opt(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(|x| x.max(0.0))
}

impl Measurement {
    /// Build a measurement. Speeds and humidity are clamped to be
    /// non-negative, directions are taken modulo 360 and safety is derived
    /// from the averaged direction.
    pub fn new(reading: SensorReading, source_id: impl Into<String>) -> Self {
        let direction = normalize_direction(reading.wind_direction_deg);
        let direction_avg = reading
            .wind_direction_avg_deg
            .map(normalize_direction)
            .unwrap_or(direction);
        let speed = non_negative(reading.wind_speed_knots);
        let safety = classify(direction_avg, speed);

        Self {
            timestamp: reading.timestamp,
            wind_speed_knots: speed,
            wind_gust_knots: non_negative_opt(reading.wind_gust_knots),
            max_gust_knots: non_negative_opt(reading.max_gust_knots),
            wind_direction_deg: direction,
            wind_direction_avg_deg: direction_avg,
            temperature_f: reading.temperature_f.filter(|t| t.is_finite()),
            humidity_pct: non_negative_opt(reading.humidity_pct),
            pressure_inhg: reading.pressure_inhg.filter(|p| p.is_finite()),
            source_id: source_id.into(),
            safety,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn wind_speed_knots(&self) -> f64 {
        self.wind_speed_knots
    }
    pub fn wind_gust_knots(&self) -> Option<f64> {
        self.wind_gust_knots
    }
    pub fn max_gust_knots(&self) -> Option<f64> {
        self.max_gust_knots
    }
    pub fn wind_direction_deg(&self) -> f64 {
        self.wind_direction_deg
    }
    pub fn wind_direction_avg_deg(&self) -> f64 {
        self.wind_direction_avg_deg
    }
    pub fn temperature_f(&self) -> Option<f64> {
        self.temperature_f
    }
    pub fn humidity_pct(&self) -> Option<f64> {
        self.humidity_pct
    }
    pub fn pressure_inhg(&self) -> Option<f64> {
        self.pressure_inhg
    }
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
    pub fn safety(&self) -> &SafetyVerdict {
        &self.safety
    }

    /// Whether the sustained speed reaches the rider's minimum.
    pub fn meets_minimum(&self, min_knots: f64) -> bool {
        self.wind_speed_knots >= min_knots
    }

    pub fn category(&self) -> WindCategory {
        WindCategory::from_knots(self.wind_speed_knots)
    }

    pub fn cardinal(&self) -> &'static str {
        degrees_to_cardinal(self.wind_direction_deg)
    }
}

// ── Forecast ──────────────────────────────────────────────────────────

/// Where to fetch a forecast for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA zone name the forecast hours are expressed in.
    pub timezone: String,
}

/// One hourly forecast slot, already in knots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub hour_of_day: u32,
    pub speed_knots: f64,
    pub direction_deg: f64,
    pub gust_knots: f64,
}

// ── Trend ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Strengthening,
    Weakening,
    Stable,
    InsufficientData,
}

impl Trend {
    pub fn icon(self) -> &'static str {
        match self {
            Trend::Strengthening => "↗",
            Trend::Weakening => "↘",
            Trend::Stable => "→",
            Trend::InsufficientData => "…",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Trend::Strengthening => "#10b981",
            Trend::Weakening => "#f59e0b",
            Trend::Stable => "#3b82f6",
            Trend::InsufficientData => "#9ca3af",
        }
    }
}

/// Result of comparing the newest speed with the one a reference interval ago.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendResult {
    pub trend: Trend,
    pub icon: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
}

impl TrendResult {
    pub fn insufficient() -> Self {
        Self {
            trend: Trend::InsufficientData,
            icon: Trend::InsufficientData.icon().to_string(),
            color: Trend::InsufficientData.color().to_string(),
            current_speed: None,
            previous_speed: None,
            change: None,
            percent_change: None,
        }
    }
}

// ── Descriptions ──────────────────────────────────────────────────────

/// Coarse speed band used for headlines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindCategory {
    Calm,
    Light,
    Moderate,
    Strong,
    Extreme,
}

impl WindCategory {
    pub fn from_knots(speed: f64) -> Self {
        if speed < 5.0 {
            WindCategory::Calm
        } else if speed < 12.0 {
            WindCategory::Light
        } else if speed < 20.0 {
            WindCategory::Moderate
        } else if speed < 30.0 {
            WindCategory::Strong
        } else {
            WindCategory::Extreme
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WindCategory::Calm => "Calm",
            WindCategory::Light => "Light wind",
            WindCategory::Moderate => "Moderate wind",
            WindCategory::Strong => "Strong wind",
            WindCategory::Extreme => "Extreme wind",
        }
    }
}

const CARDINALS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// 16-point compass name for a bearing.
pub fn degrees_to_cardinal(deg: f64) -> &'static str {
    let d = normalize_direction(deg);
    let idx = ((d / 22.5).round() as usize) % CARDINALS.len();
    CARDINALS[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SafetyLevel;
    use chrono::TimeZone;

    fn reading(speed: f64, dir: f64) -> SensorReading {
        SensorReading {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            wind_speed_knots: speed,
            wind_gust_knots: Some(-2.0),
            max_gust_knots: None,
            wind_direction_deg: dir,
            wind_direction_avg_deg: None,
            temperature_f: Some(85.0),
            humidity_pct: Some(-5.0),
            pressure_inhg: None,
        }
    }

    #[test]
    fn test_measurement_normalizes_values() {
        let m = Measurement::new(reading(-3.0, 450.0), "test");
        assert_eq!(m.wind_speed_knots(), 0.0);
        assert_eq!(m.wind_gust_knots(), Some(0.0));
        assert_eq!(m.humidity_pct(), Some(0.0));
        assert_eq!(m.wind_direction_deg(), 90.0);
        assert_eq!(m.wind_direction_avg_deg(), 90.0);
        assert_eq!(m.source_id(), "test");
    }

    #[test]
    fn test_measurement_uses_average_direction_for_safety() {
        let mut r = reading(15.0, 90.0);
        r.wind_direction_avg_deg = Some(270.0);
        let m = Measurement::new(r, "test");
        assert_eq!(m.safety().level, SafetyLevel::Danger);
        assert!(m.safety().is_offshore);
    }

    #[test]
    fn test_deserialize_rebuilds_through_constructor() {
        let json = r##"{
            "timestamp": "2026-03-01T10:00:00Z",
            "wind_speed_knots": -7.0,
            "wind_gust_knots": null,
            "max_gust_knots": null,
            "wind_direction_deg": 720.0,
            "wind_direction_avg_deg": 270.0,
            "temperature_f": 85.0,
            "humidity_pct": -40.0,
            "pressure_inhg": null,
            "source_id": "ambient_weather",
            "safety": {
                "level": "safe",
                "label": "Safe - Onshore",
                "color": "#10b981",
                "is_offshore": false,
                "is_onshore": true
            }
        }"##;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.wind_speed_knots(), 0.0);
        assert_eq!(m.wind_direction_deg(), 0.0);
        assert_eq!(m.humidity_pct(), Some(0.0));
        assert_eq!(m.safety().level, SafetyLevel::Danger);
        assert!(m.safety().is_offshore);

        let back: Measurement = serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_cardinal_points() {
        assert_eq!(degrees_to_cardinal(0.0), "N");
        assert_eq!(degrees_to_cardinal(359.0), "N");
        assert_eq!(degrees_to_cardinal(90.0), "E");
        assert_eq!(degrees_to_cardinal(202.5), "SSW");
        assert_eq!(degrees_to_cardinal(270.0), "W");
    }

    #[test]
    fn test_wind_category_bands() {
        assert_eq!(WindCategory::from_knots(0.0), WindCategory::Calm);
        assert_eq!(WindCategory::from_knots(5.0), WindCategory::Light);
        assert_eq!(WindCategory::from_knots(12.0), WindCategory::Moderate);
        assert_eq!(WindCategory::from_knots(29.9), WindCategory::Strong);
        assert_eq!(WindCategory::from_knots(30.0), WindCategory::Extreme);
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("proxied".parse::<SourceKind>().unwrap(), SourceKind::Proxied);
        assert_eq!("ambient_weather".parse::<SourceKind>().unwrap(), SourceKind::Ambient);
        assert!("windsock".parse::<SourceKind>().is_err());
    }
}
