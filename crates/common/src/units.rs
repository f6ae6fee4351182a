//! Unit conversions for wind speed and temperature.

use serde::{Deserialize, Serialize};

/// Knots per mile-per-hour.
pub const MPH_TO_KNOTS: f64 = 0.868976;
/// Knots per kilometre-per-hour (1 / 1.852).
pub const KMH_TO_KNOTS: f64 = 0.539957;
/// Kilometres-per-hour per knot.
pub const KNOTS_TO_KMH: f64 = 1.852;
/// Metres-per-second per knot.
pub const KNOTS_TO_MS: f64 = 0.514444;

pub fn mph_to_knots(mph: f64) -> f64 {
    mph * MPH_TO_KNOTS
}

pub fn kmh_to_knots(kmh: f64) -> f64 {
    kmh * KMH_TO_KNOTS
}

pub fn knots_to_kmh(knots: f64) -> f64 {
    knots * KNOTS_TO_KMH
}

/// Display unit for wind speed. Internally everything is knots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Knots,
    MetersPerSecond,
    KilometersPerHour,
}

/// Conversion factor from knots plus display labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedUnitInfo {
    pub factor_from_knots: f64,
    pub label: &'static str,
    pub short_label: &'static str,
}

impl SpeedUnit {
    pub const ALL: [SpeedUnit; 3] = [
        SpeedUnit::Knots,
        SpeedUnit::MetersPerSecond,
        SpeedUnit::KilometersPerHour,
    ];

    pub fn info(self) -> SpeedUnitInfo {
        match self {
            SpeedUnit::Knots => SpeedUnitInfo {
                factor_from_knots: 1.0,
                label: "knots",
                short_label: "kts",
            },
            SpeedUnit::MetersPerSecond => SpeedUnitInfo {
                factor_from_knots: KNOTS_TO_MS,
                label: "m/s",
                short_label: "m/s",
            },
            SpeedUnit::KilometersPerHour => SpeedUnitInfo {
                factor_from_knots: KNOTS_TO_KMH,
                label: "km/h",
                short_label: "km/h",
            },
        }
    }

    /// Convert a speed in knots into this unit.
    pub fn from_knots(self, knots: f64) -> f64 {
        knots * self.info().factor_from_knots
    }

    pub fn label(self) -> &'static str {
        self.info().label
    }

    pub fn short_label(self) -> &'static str {
        self.info().short_label
    }
}

impl std::str::FromStr for SpeedUnit {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knots" | "kts" | "kn" => Ok(SpeedUnit::Knots),
            "ms" | "m/s" | "meters_per_second" => Ok(SpeedUnit::MetersPerSecond),
            "kmh" | "km/h" | "kilometers_per_hour" => Ok(SpeedUnit::KilometersPerHour),
            other => Err(crate::Error::Config(format!("unknown speed unit: {other}"))),
        }
    }
}

/// Display unit for temperature. Sensors report Fahrenheit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn from_fahrenheit(self, f: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => f,
            TemperatureUnit::Celsius => (f - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }
}

impl std::str::FromStr for TemperatureUnit {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            other => Err(crate::Error::Config(format!(
                "unknown temperature unit: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mph_to_knots_exact() {
        assert!((mph_to_knots(10.0) - 8.68976).abs() < 1e-9);
    }

    #[test]
    fn test_kmh_round_trip() {
        for kmh in [0.0, 1.0, 18.5, 42.0, 120.0] {
            let back = knots_to_kmh(kmh_to_knots(kmh));
            assert!((back - kmh).abs() < 1e-3 * kmh.max(1.0), "{kmh} -> {back}");
        }
    }

    #[test]
    fn test_speed_unit_table() {
        assert_eq!(SpeedUnit::Knots.from_knots(10.0), 10.0);
        assert!((SpeedUnit::KilometersPerHour.from_knots(10.0) - 18.52).abs() < 1e-9);
        assert!((SpeedUnit::MetersPerSecond.from_knots(10.0) - 5.14444).abs() < 1e-9);
        for unit in SpeedUnit::ALL {
            assert!(!unit.label().is_empty());
            assert!(!unit.short_label().is_empty());
        }
    }

    #[test]
    fn test_speed_unit_parse() {
        assert_eq!("kmh".parse::<SpeedUnit>().unwrap(), SpeedUnit::KilometersPerHour);
        assert_eq!("KTS".parse::<SpeedUnit>().unwrap(), SpeedUnit::Knots);
        assert!("furlongs".parse::<SpeedUnit>().is_err());
    }

    #[test]
    fn test_temperature_conversion() {
        assert_eq!(TemperatureUnit::Fahrenheit.from_fahrenheit(85.0), 85.0);
        assert!((TemperatureUnit::Celsius.from_fahrenheit(212.0) - 100.0).abs() < 1e-9);
        assert_eq!("C".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::Celsius);
        assert!("kelvin".parse::<TemperatureUnit>().is_err());
    }
}
