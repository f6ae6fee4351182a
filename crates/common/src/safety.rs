//! Rider safety classification from wind direction and speed.
//!
//! The spot faces east: wind from the west quadrant blows off the land and
//! pushes riders out to sea.

use serde::{Deserialize, Serialize};

/// Offshore window, degrees inclusive.
pub const OFFSHORE_MIN_DEG: f64 = 225.0;
pub const OFFSHORE_MAX_DEG: f64 = 315.0;
/// Onshore window, degrees inclusive.
pub const ONSHORE_MIN_DEG: f64 = 45.0;
pub const ONSHORE_MAX_DEG: f64 = 135.0;
/// Safe speed band for onshore wind, knots inclusive.
pub const SAFE_MIN_KNOTS: f64 = 12.0;
pub const SAFE_MAX_KNOTS: f64 = 25.0;
/// Anything above this is dangerous regardless of direction.
pub const EXTREME_KNOTS: f64 = 30.0;

pub const COLOR_DANGER: &str = "#ef4444";
pub const COLOR_SAFE: &str = "#10b981";
pub const COLOR_CAUTION: &str = "#f59e0b";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Danger,
}

impl SafetyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Caution => "caution",
            SafetyLevel::Danger => "danger",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "safe" => Some(SafetyLevel::Safe),
            "caution" => Some(SafetyLevel::Caution),
            "danger" => Some(SafetyLevel::Danger),
            _ => None,
        }
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    pub label: String,
    pub color: String,
    pub is_offshore: bool,
    pub is_onshore: bool,
}

/// Normalize a bearing into `[0, 360)`.
pub fn normalize_direction(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negatives.
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

pub fn is_offshore(direction_deg: f64) -> bool {
    let d = normalize_direction(direction_deg);
    (OFFSHORE_MIN_DEG..=OFFSHORE_MAX_DEG).contains(&d)
}

pub fn is_onshore(direction_deg: f64) -> bool {
    let d = normalize_direction(direction_deg);
    (ONSHORE_MIN_DEG..=ONSHORE_MAX_DEG).contains(&d)
}

/// Classify riding conditions. First matching rule wins; offshore is checked
/// before the safe band and must stay that way.
pub fn classify(direction_deg: f64, speed_knots: f64) -> SafetyVerdict {
    let offshore = is_offshore(direction_deg);
    let onshore = is_onshore(direction_deg);
    let speed = speed_knots.max(0.0);

    let (level, label, color) = if offshore || speed > EXTREME_KNOTS {
        let label = if offshore {
            "Danger - Offshore"
        } else {
            "Danger - Extreme wind"
        };
        (SafetyLevel::Danger, label, COLOR_DANGER)
    } else if onshore && (SAFE_MIN_KNOTS..=SAFE_MAX_KNOTS).contains(&speed) {
        (SafetyLevel::Safe, "Safe - Onshore", COLOR_SAFE)
    } else {
        (SafetyLevel::Caution, "Caution", COLOR_CAUTION)
    };

    SafetyVerdict {
        level,
        label: label.to_string(),
        color: color.to_string(),
        is_offshore: offshore,
        is_onshore: onshore,
    }
}
