//! Reading aggregation.
//!
//! [`AqiCalculator`] turns one raw [`SensorReading`] into an [`AqiResult`]:
//! every concentration is interpolated to a sub-index, folded into the
//! windowed history of both the reading's location and the overall region,
//! and the highest windowed average in each scope becomes that scope's index.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, warn};

use aqi_types::{AqiResult, Pollutant, PollutantConcentrations, ScopeAqi, SensorReading};

use crate::breakpoints;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::history::{HistoryStore, ScopeKey};
use crate::metrics::EngineMetrics;

/// Running maximum over windowed averages.
///
/// Only a strictly greater value replaces the current worst, so on a tie the
/// pollutant seen first keeps the title.
#[derive(Debug, Default)]
struct WorstTracker {
    worst: Option<(Pollutant, f64)>,
    sub_indices: BTreeMap<Pollutant, f64>,
}

impl WorstTracker {
    fn observe(&mut self, pollutant: Pollutant, average: f64) {
        self.sub_indices.insert(pollutant, average);
        if self.worst.is_none_or(|(_, current)| average > current) {
            self.worst = Some((pollutant, average));
        }
    }

    fn finish(self, calculation_time: OffsetDateTime) -> ScopeAqi {
        ScopeAqi::new(
            calculation_time,
            self.worst.map(|(_, aqi)| aqi),
            self.worst.map(|(p, _)| p),
            self.sub_indices,
        )
    }
}

/// Multi-pollutant index calculator.
///
/// Shared across request handlers through an `Arc`; every method takes
/// `&self`.
///
/// # Example
///
/// ```
/// use aqi_core::AqiCalculator;
/// use aqi_types::SensorReading;
///
/// let calculator = AqiCalculator::new();
/// let reading = SensorReading::new(28.6, 77.2)
///     .with_pollutant("PM10", 50.0)
///     .with_pollutant("NO2", 80.0);
///
/// let result = calculator.calculate_final_aqi(&reading).unwrap();
/// assert_eq!(result.aqi(), Some(100.0));
/// assert_eq!(result.scope_key, "28.6,77.2");
/// ```
pub struct AqiCalculator {
    clock: Arc<dyn Clock>,
    history: HistoryStore,
    metrics: EngineMetrics,
}

impl AqiCalculator {
    /// Create a calculator on the system clock with the default window.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            history: HistoryStore::default(),
            metrics: EngineMetrics::new(),
        }
    }

    /// Create a calculator with an explicit clock and averaging window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the window is zero or longer than
    /// [`MAX_WINDOW`](crate::history::MAX_WINDOW).
    pub fn with_clock(clock: Arc<dyn Clock>, window: Duration) -> Result<Self> {
        Ok(Self {
            clock,
            history: HistoryStore::new(window)?,
            metrics: EngineMetrics::new(),
        })
    }

    /// Create a calculator on the system clock with a custom window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the window is zero or longer than
    /// [`MAX_WINDOW`](crate::history::MAX_WINDOW).
    pub fn with_window(window: Duration) -> Result<Self> {
        Self::with_clock(Arc::new(SystemClock), window)
    }

    /// Compute the location and overall index for a reading.
    ///
    /// The reading is validated before anything is recorded. Pollutants are
    /// then processed in the order they arrived; an unknown identifier stops
    /// processing, leaving the pollutants before it recorded.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidReading`] if coordinates or pollutants are missing,
    ///   or a value is non-finite or negative.
    /// - [`Error::UnknownPollutant`] if an identifier has no breakpoint table.
    pub fn calculate_final_aqi(&self, reading: &SensorReading) -> Result<AqiResult> {
        let (latitude, longitude, pollutants) = match validate(reading) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Rejected reading: {}", e);
                self.metrics.record_rejected();
                return Err(e);
            }
        };

        let location_key = ScopeKey::location(latitude, longitude);
        let now = self.clock.now();

        let mut location = WorstTracker::default();
        let mut overall = WorstTracker::default();

        for (id, concentration) in pollutants.iter() {
            let pollutant: Pollutant = match id.parse() {
                Ok(p) => p,
                Err(e) => {
                    let e = Error::from(e);
                    warn!(location = %location_key, "Rejected reading: {}", e);
                    self.metrics.record_unknown_pollutant();
                    return Err(e);
                }
            };
            let sub_index = breakpoints::sub_index(pollutant, concentration);

            let at_location = self
                .history
                .record_detailed(&location_key, pollutant, sub_index, now);
            let at_overall = self
                .history
                .record_detailed(&ScopeKey::Overall, pollutant, sub_index, now);
            self.metrics.record_samples(2, (at_location.evicted + at_overall.evicted) as u64);

            location.observe(pollutant, at_location.average);
            overall.observe(pollutant, at_overall.average);
        }

        let result = AqiResult {
            scope_key: location_key.to_string(),
            scope_name: reading.name.clone(),
            location: location.finish(now),
            overall: overall.finish(now),
        };
        self.metrics.record_processed();

        debug!(
            location = %result.scope_key,
            aqi = ?result.location.aqi,
            pollutant = ?result.location.worst_pollutant,
            overall_aqi = ?result.overall.aqi,
            "Computed index"
        );

        Ok(result)
    }

    /// The windowed history backing this calculator.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Engine counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// The averaging window.
    pub fn window(&self) -> Duration {
        self.history.window()
    }
}

impl Default for AqiCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AqiCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AqiCalculator")
            .field("clock", &self.clock)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

fn validate(reading: &SensorReading) -> Result<(f64, f64, &PollutantConcentrations)> {
    let latitude = coordinate(reading.latitude, "latitude")?;
    let longitude = coordinate(reading.longitude, "longitude")?;

    let pollutants = reading
        .pollutants
        .as_ref()
        .ok_or_else(|| Error::invalid_reading("missing 'pollutants'"))?;
    if pollutants.is_empty() {
        return Err(Error::invalid_reading("'pollutants' is empty"));
    }

    for (id, concentration) in pollutants.iter() {
        if !concentration.is_finite() {
            return Err(Error::invalid_reading(format!(
                "concentration of '{id}' is not a finite number"
            )));
        }
        if concentration < 0.0 {
            return Err(Error::invalid_reading(format!(
                "concentration of '{id}' is negative: {concentration}"
            )));
        }
    }

    Ok((latitude, longitude, pollutants))
}

fn coordinate(value: Option<f64>, field: &str) -> Result<f64> {
    match value {
        None => Err(Error::invalid_reading(format!("missing '{field}'"))),
        Some(v) if !v.is_finite() => Err(Error::invalid_reading(format!(
            "'{field}' is not a finite number"
        ))),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::history::DEFAULT_WINDOW;

    fn calculator() -> (Arc<ManualClock>, AqiCalculator) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let calc = AqiCalculator::with_clock(clock.clone(), DEFAULT_WINDOW).unwrap();
        (clock, calc)
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = AqiCalculator::with_window(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_oversized_window_rejected() {
        let four_thousand_years = Duration::from_secs(4_000 * 365 * 24 * 60 * 60);
        assert!(matches!(
            AqiCalculator::with_window(four_thousand_years),
            Err(Error::InvalidConfig(_))
        ));

        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        assert!(matches!(
            AqiCalculator::with_clock(clock, Duration::from_secs(u64::MAX)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let (_, calc) = calculator();
        // PM25 146 -> 120, PM10 140 -> 95, NO2 100 -> 120
        let reading = SensorReading::new(1.0, 1.0)
            .with_pollutant("PM25", 146.0)
            .with_pollutant("PM10", 140.0)
            .with_pollutant("NO2", 100.0);

        let result = calc.calculate_final_aqi(&reading).unwrap();
        assert_eq!(result.location.sub_indices[&Pollutant::Pm25], 120.0);
        assert_eq!(result.location.sub_indices[&Pollutant::Pm10], 95.0);
        assert_eq!(result.location.sub_indices[&Pollutant::No2], 120.0);
        assert_eq!(result.aqi(), Some(120.0));
        assert_eq!(result.worst_pollutant(), Some(Pollutant::Pm25));
    }

    #[test]
    fn test_tie_order_follows_reading_not_enum() {
        let (_, calc) = calculator();
        let reading = SensorReading::new(1.0, 1.0)
            .with_pollutant("NO2", 100.0)
            .with_pollutant("PM25", 146.0);

        let result = calc.calculate_final_aqi(&reading).unwrap();
        assert_eq!(result.worst_pollutant(), Some(Pollutant::No2));
    }

    #[test]
    fn test_invalid_readings_rejected_without_mutation() {
        let (_, calc) = calculator();

        let cases = [
            SensorReading {
                latitude: None,
                ..SensorReading::new(1.0, 2.0).with_pollutant("PM10", 50.0)
            },
            SensorReading {
                longitude: Some(f64::NAN),
                ..SensorReading::new(1.0, 2.0).with_pollutant("PM10", 50.0)
            },
            SensorReading {
                pollutants: None,
                ..SensorReading::new(1.0, 2.0)
            },
            SensorReading::new(1.0, 2.0),
            SensorReading::new(1.0, 2.0)
                .with_pollutant("PM10", 50.0)
                .with_pollutant("NO2", -1.0),
            SensorReading::new(1.0, 2.0)
                .with_pollutant("PM10", 50.0)
                .with_pollutant("CO", f64::INFINITY),
        ];

        for reading in &cases {
            let err = calc.calculate_final_aqi(reading).unwrap_err();
            assert!(matches!(err, Error::InvalidReading(_)), "{reading:?} gave {err:?}");
        }

        assert_eq!(calc.history().scope_count(), 0);
        let stats = calc.metrics().snapshot();
        assert_eq!(stats.readings_rejected, cases.len() as u64);
        assert_eq!(stats.samples_recorded, 0);
    }

    #[test]
    fn test_unknown_pollutant_keeps_earlier_samples() {
        let (_, calc) = calculator();
        let reading = SensorReading::new(5.0, 6.0)
            .with_pollutant("PM10", 50.0)
            .with_pollutant("CO2", 400.0)
            .with_pollutant("NO2", 40.0);

        let err = calc.calculate_final_aqi(&reading).unwrap_err();
        assert_eq!(err, Error::UnknownPollutant("CO2".to_string()));

        let key = ScopeKey::location(5.0, 6.0);
        assert_eq!(calc.history().average(&key, Pollutant::Pm10), Some(50.0));
        assert_eq!(calc.history().average(&ScopeKey::Overall, Pollutant::Pm10), Some(50.0));
        assert_eq!(calc.history().average(&key, Pollutant::No2), None);
        assert_eq!(calc.metrics().snapshot().unknown_pollutant_failures, 1);
    }

    #[test]
    fn test_calculation_time_shared_by_both_scopes() {
        let (clock, calc) = calculator();
        let reading = SensorReading::new(1.0, 1.0).with_pollutant("O3", 50.0);

        let result = calc.calculate_final_aqi(&reading).unwrap();
        assert_eq!(result.location.calculation_time, clock.now());
        assert_eq!(result.overall.calculation_time, clock.now());
    }

    #[test]
    fn test_name_and_category_carried() {
        let (_, calc) = calculator();
        let reading = SensorReading::new(28.6, 77.2)
            .with_name("ITO")
            .with_pollutant("PM25", 250.0);

        let result = calc.calculate_final_aqi(&reading).unwrap();
        assert_eq!(result.scope_name.as_deref(), Some("ITO"));
        assert_eq!(result.aqi(), Some(200.0));
        assert_eq!(result.location.category, Some(aqi_types::AqiCategory::Moderate));
    }

    #[test]
    fn test_empty_tracker_has_no_index() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let scope = WorstTracker::default().finish(now);
        assert_eq!(scope.aqi, None);
        assert_eq!(scope.worst_pollutant, None);
        assert!(scope.sub_indices.is_empty());
    }
}
