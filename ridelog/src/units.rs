//! Distance unit conversion.
//!
//! The store always persists kilometers. Values crossing the repository boundary
//! are converted to and from the user's display unit.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kilometers in one international mile.
pub const KM_PER_MILE: f64 = 1.609344;

/// Display unit for distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "KM")]
    Km,
    #[serde(rename = "MI")]
    Mi,
}

impl DistanceUnit {
    pub const ALL: [DistanceUnit; 2] = [DistanceUnit::Km, DistanceUnit::Mi];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::Km => "KM",
            DistanceUnit::Mi => "MI",
        }
    }

    /// The other unit (used by the settings toggle).
    pub fn toggled(self) -> Self {
        match self {
            DistanceUnit::Km => DistanceUnit::Mi,
            DistanceUnit::Mi => DistanceUnit::Km,
        }
    }

    /// Convert a stored kilometer value into this unit.
    pub fn from_km(self, km: f64) -> f64 {
        match self {
            DistanceUnit::Km => km,
            DistanceUnit::Mi => km / KM_PER_MILE,
        }
    }

    /// Convert a value in this unit into kilometers for storage.
    pub fn to_km(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Km => value,
            DistanceUnit::Mi => value * KM_PER_MILE,
        }
    }
}

impl std::fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown distance unit: {0:?}")]
pub struct UnknownUnit(pub String);

impl FromStr for DistanceUnit {
    type Err = UnknownUnit;

    /// Parses the persisted form, `"KM"` or `"MI"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KM" => Ok(DistanceUnit::Km),
            "MI" => Ok(DistanceUnit::Mi),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

/// Convert `value` from one display unit into another.
pub fn convert(value: f64, from: DistanceUnit, to: DistanceUnit) -> f64 {
    if from == to {
        return value;
    }
    to.from_km(from.to_km(value))
}
