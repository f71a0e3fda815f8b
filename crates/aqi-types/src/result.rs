//! Computed index results.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{AqiCategory, Pollutant};

/// Index result for a single scope (one location, or the overall region).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScopeAqi {
    /// When the result was computed.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub calculation_time: OffsetDateTime,
    /// The reported index: the highest windowed sub-index in this scope.
    #[cfg_attr(feature = "serde", serde(rename = "AQI"))]
    pub aqi: Option<f64>,
    /// The pollutant responsible for [`ScopeAqi::aqi`].
    #[cfg_attr(feature = "serde", serde(rename = "pollutant"))]
    pub worst_pollutant: Option<Pollutant>,
    /// Windowed average sub-index of every pollutant in the reading.
    pub sub_indices: BTreeMap<Pollutant, f64>,
    /// Health category of [`ScopeAqi::aqi`].
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<AqiCategory>,
}

impl ScopeAqi {
    /// Build a scope result, deriving the category from the index.
    pub fn new(
        calculation_time: OffsetDateTime,
        aqi: Option<f64>,
        worst_pollutant: Option<Pollutant>,
        sub_indices: BTreeMap<Pollutant, f64>,
    ) -> Self {
        Self {
            calculation_time,
            aqi,
            worst_pollutant,
            sub_indices,
            category: aqi.map(AqiCategory::from_aqi),
        }
    }
}

/// Combined result produced for one sensor reading.
///
/// The location-scoped fields sit at the top level; the aggregate region
/// result is nested under [`AqiResult::overall`]. Both share the same
/// `calculation_time`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AqiResult {
    /// Canonical key of the location scope (`"lat,lon"`).
    #[cfg_attr(feature = "serde", serde(rename = "locationKey"))]
    pub scope_key: String,
    /// Display name supplied with the reading.
    #[cfg_attr(feature = "serde", serde(rename = "locationName"))]
    pub scope_name: Option<String>,
    /// Result for the reading's location.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub location: ScopeAqi,
    /// Result for the aggregate region.
    pub overall: ScopeAqi,
}

impl AqiResult {
    /// The location's reported index.
    pub fn aqi(&self) -> Option<f64> {
        self.location.aqi
    }

    /// The location's worst pollutant.
    pub fn worst_pollutant(&self) -> Option<Pollutant> {
        self.location.worst_pollutant
    }

    /// When this result was computed.
    pub fn calculation_time(&self) -> OffsetDateTime {
        self.location.calculation_time
    }
}
