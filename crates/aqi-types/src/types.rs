//! Core types for air quality readings.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A pollutant tracked by the index.
///
/// The wire identifiers (`"PM10"`, `"PM25"`, ...) are exactly the strings
/// returned by [`Pollutant::id`]. Ordering follows declaration order, which is
/// also the canonical order of [`Pollutant::ALL`].
///
/// # Examples
///
/// ```
/// use aqi_types::Pollutant;
///
/// let p: Pollutant = "PM25".parse().unwrap();
/// assert_eq!(p, Pollutant::Pm25);
/// assert_eq!(p.to_string(), "PM25");
/// assert!("CO2".parse::<Pollutant>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pollutant {
    /// Particulate matter up to 10 µm.
    #[cfg_attr(feature = "serde", serde(rename = "PM10"))]
    Pm10,
    /// Particulate matter up to 2.5 µm.
    #[cfg_attr(feature = "serde", serde(rename = "PM25"))]
    Pm25,
    /// Nitrogen dioxide.
    #[cfg_attr(feature = "serde", serde(rename = "NO2"))]
    No2,
    /// Sulphur dioxide.
    #[cfg_attr(feature = "serde", serde(rename = "SO2"))]
    So2,
    /// Carbon monoxide.
    #[cfg_attr(feature = "serde", serde(rename = "CO"))]
    Co,
    /// Ozone.
    #[cfg_attr(feature = "serde", serde(rename = "O3"))]
    O3,
    /// Ammonia.
    #[cfg_attr(feature = "serde", serde(rename = "NH3"))]
    Nh3,
    /// Lead.
    #[cfg_attr(feature = "serde", serde(rename = "Pb"))]
    Pb,
}

impl Pollutant {
    /// Number of supported pollutants.
    pub const COUNT: usize = 8;

    /// All supported pollutants in canonical order.
    pub const ALL: [Pollutant; Self::COUNT] = [
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
        Pollutant::O3,
        Pollutant::Nh3,
        Pollutant::Pb,
    ];

    /// The wire identifier for this pollutant.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Pollutant::Pm10 => "PM10",
            Pollutant::Pm25 => "PM25",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O3",
            Pollutant::Nh3 => "NH3",
            Pollutant::Pb => "Pb",
        }
    }

    /// Position of this pollutant in [`Pollutant::ALL`].
    ///
    /// Useful for fixed-size per-pollutant storage.
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Pollutant {
    type Err = ParseError;

    /// Parse a pollutant from its exact wire identifier.
    ///
    /// Matching is case-sensitive: `"pm10"` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pollutant::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| ParseError::UnknownPollutant(s.to_string()))
    }
}

/// Pollutants an ingestion layer must require on every reading.
///
/// The engine itself only rejects identifiers it does not recognize; a
/// pollutant that is merely absent is accepted.
pub const REQUIRED_POLLUTANTS: [Pollutant; Pollutant::COUNT] = Pollutant::ALL;

/// Health category for an AQI value.
///
/// Bands follow the National Air Quality Index scale the breakpoint tables are
/// taken from. Ordered by severity, so `category >= AqiCategory::Poor` works
/// as a threshold check.
///
/// ```
/// use aqi_types::AqiCategory;
///
/// assert_eq!(AqiCategory::from_aqi(42.0), AqiCategory::Good);
/// assert_eq!(AqiCategory::from_aqi(150.0), AqiCategory::Moderate);
/// assert!(AqiCategory::from_aqi(450.0) > AqiCategory::Poor);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum AqiCategory {
    /// 0 - 50.
    Good,
    /// 51 - 100.
    Satisfactory,
    /// 101 - 200.
    Moderate,
    /// 201 - 300.
    Poor,
    /// 301 - 400.
    VeryPoor,
    /// 401 - 500.
    Severe,
}

impl AqiCategory {
    /// Categorize an index value.
    ///
    /// Upper bounds are inclusive on the continuous scale, so an index of
    /// exactly 100 is still `Satisfactory`.
    #[must_use]
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            AqiCategory::Good
        } else if aqi <= 100.0 {
            AqiCategory::Satisfactory
        } else if aqi <= 200.0 {
            AqiCategory::Moderate
        } else if aqi <= 300.0 {
            AqiCategory::Poor
        } else if aqi <= 400.0 {
            AqiCategory::VeryPoor
        } else {
            AqiCategory::Severe
        }
    }

    /// Human-readable description of the health impact.
    pub fn description(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good - minimal impact",
            AqiCategory::Satisfactory => "Satisfactory - minor discomfort to sensitive people",
            AqiCategory::Moderate => "Moderate - discomfort to people with lung or heart disease",
            AqiCategory::Poor => "Poor - breathing discomfort on prolonged exposure",
            AqiCategory::VeryPoor => "Very Poor - respiratory illness on prolonged exposure",
            AqiCategory::Severe => "Severe - affects healthy people, serious for the ill",
        }
    }

    /// Suggested action for this category.
    pub fn action(&self) -> &'static str {
        match self {
            AqiCategory::Good | AqiCategory::Satisfactory => "No action needed",
            AqiCategory::Moderate => "Sensitive groups should limit prolonged outdoor exertion",
            AqiCategory::Poor => "Reduce prolonged or heavy outdoor exertion",
            AqiCategory::VeryPoor => "Avoid outdoor activity, keep windows closed",
            AqiCategory::Severe => "Stay indoors and use air purification",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AqiCategory::Good => write!(f, "Good"),
            AqiCategory::Satisfactory => write!(f, "Satisfactory"),
            AqiCategory::Moderate => write!(f, "Moderate"),
            AqiCategory::Poor => write!(f, "Poor"),
            AqiCategory::VeryPoor => write!(f, "Very Poor"),
            AqiCategory::Severe => write!(f, "Severe"),
        }
    }
}

/// Pollutant concentrations carried by a reading, in arrival order.
///
/// Identifiers are kept as raw strings so that an unsupported pollutant can be
/// reported by the engine rather than rejected while decoding. Order matters:
/// it decides which pollutant wins a tie for "worst".
///
/// When deserialized from a JSON object, a repeated key keeps the position of
/// its first occurrence and the value of its last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollutantConcentrations {
    entries: Vec<(String, f64)>,
    /// Position of each identifier in `entries`.
    positions: HashMap<String, usize>,
}

impl PollutantConcentrations {
    /// Create an empty set of concentrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concentration for a pollutant identifier.
    ///
    /// Replaces the value in place if the identifier is already present.
    pub fn insert(&mut self, id: impl Into<String>, concentration: f64) {
        let id = id.into();
        match self.positions.get(&id) {
            Some(&pos) => self.entries[pos].1 = concentration,
            None => {
                self.positions.insert(id.clone(), self.entries.len());
                self.entries.push((id, concentration));
            }
        }
    }

    /// Concentration for an identifier, if present.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.positions.get(id).map(|&pos| self.entries[pos].1)
    }

    /// Iterate over `(identifier, concentration)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(id, c)| (id.as_str(), *c))
    }

    /// Number of pollutants present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pollutants are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Which of the `required` pollutants are absent.
    pub fn missing(&self, required: &[Pollutant]) -> Vec<Pollutant> {
        required
            .iter()
            .copied()
            .filter(|p| self.get(p.id()).is_none())
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for PollutantConcentrations {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut concentrations = Self::new();
        for (id, c) in iter {
            concentrations.insert(id, c);
        }
        concentrations
    }
}

#[cfg(feature = "serde")]
impl Serialize for PollutantConcentrations {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, c) in &self.entries {
            map.serialize_entry(id, c)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for PollutantConcentrations {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> serde::de::Visitor<'de> for OrderedVisitor {
            type Value = PollutantConcentrations;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of pollutant identifiers to concentrations")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut concentrations = PollutantConcentrations::new();
                while let Some((id, c)) = access.next_entry::<String, f64>()? {
                    concentrations.insert(id, c);
                }
                Ok(concentrations)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// A raw sensor reading as handed over by the ingestion layer.
///
/// Every field is optional at the type level: a reading missing its location
/// or pollutants is still representable so the engine can reject it with a
/// proper error instead of a decoding failure.
///
/// ```
/// use aqi_types::SensorReading;
///
/// let reading = SensorReading::new(28.6, 77.2)
///     .with_name("Connaught Place")
///     .with_pollutant("PM10", 50.0)
///     .with_pollutant("NO2", 40.0);
///
/// assert_eq!(reading.pollutants.as_ref().map(|p| p.len()), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    /// Sensor latitude.
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "locationLat", skip_serializing_if = "Option::is_none")
    )]
    pub latitude: Option<f64>,
    /// Sensor longitude.
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "locationLon", skip_serializing_if = "Option::is_none")
    )]
    pub longitude: Option<f64>,
    /// Optional display name of the sensor location.
    #[cfg_attr(
        feature = "serde",
        serde(default, alias = "locationName", skip_serializing_if = "Option::is_none")
    )]
    pub name: Option<String>,
    /// Pollutant concentrations keyed by wire identifier.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub pollutants: Option<PollutantConcentrations>,
}

impl SensorReading {
    /// Create a reading at the given coordinates with no pollutants yet.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            name: None,
            pollutants: Some(PollutantConcentrations::new()),
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a pollutant concentration.
    #[must_use]
    pub fn with_pollutant(mut self, id: impl Into<String>, concentration: f64) -> Self {
        self.pollutants
            .get_or_insert_with(PollutantConcentrations::new)
            .insert(id, concentration);
        self
    }
}


/// Property-based tests for categories and concentration maps.
///
/// # Running Tests
///
/// ```bash
/// cargo test -p aqi-types types::proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn category_never_decreases(a in 0.0f64..600.0, b in 0.0f64..600.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(AqiCategory::from_aqi(lo) <= AqiCategory::from_aqi(hi));
        }

        #[test]
        fn missing_is_complement_of_present(mask in any::<u8>()) {
            let present: Vec<Pollutant> = Pollutant::ALL
                .into_iter()
                .filter(|p| mask & (1 << p.index()) != 0)
                .collect();
            let c: PollutantConcentrations = present.iter().map(|p| (p.id(), 1.0)).collect();

            let missing = c.missing(&REQUIRED_POLLUTANTS);
            prop_assert_eq!(missing.len() + present.len(), Pollutant::COUNT);
            for p in &missing {
                prop_assert!(!present.contains(p));
            }
        }
    }
}
