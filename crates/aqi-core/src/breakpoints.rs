//! Breakpoint tables and sub-index interpolation.
//!
//! Each pollutant has five concentration thresholds. Threshold `i` closes the
//! index segment `[INDEX_BREAKPOINTS[i], INDEX_BREAKPOINTS[i + 1]]`, and a
//! concentration inside a segment is mapped onto it linearly. Anything above
//! the last threshold is clamped to [`MAX_INDEX`].
//!
//! # Example
//!
//! ```
//! use aqi_core::breakpoints::{sub_index, sub_index_for, MAX_INDEX};
//! use aqi_types::Pollutant;
//!
//! // Exactly on a threshold gives exactly the index breakpoint
//! assert_eq!(sub_index(Pollutant::Pm10, 150.0), 100.0);
//!
//! // Halfway through the first segment
//! assert_eq!(sub_index(Pollutant::No2, 20.0), 25.0);
//!
//! // Past the table is a clamp, not an extrapolation
//! assert_eq!(sub_index(Pollutant::Co, 1_000.0), MAX_INDEX);
//!
//! // String identifiers are resolved first
//! assert!(sub_index_for("CO2", 400.0).is_err());
//! ```

use aqi_types::Pollutant;

use crate::error::Result;

/// Index values bounding each interpolation segment.
pub const INDEX_BREAKPOINTS: [f64; 7] = [0.0, 50.0, 100.0, 200.0, 300.0, 400.0, 500.0];

/// Index reported for any concentration beyond the last threshold.
pub const MAX_INDEX: f64 = 500.0;

/// Number of concentration thresholds per pollutant.
pub const THRESHOLD_COUNT: usize = 5;

const PM10: [f64; THRESHOLD_COUNT] = [50.0, 150.0, 250.0, 350.0, 430.0];
const PM25: [f64; THRESHOLD_COUNT] = [60.0, 120.0, 250.0, 350.0, 500.0];
const NO2: [f64; THRESHOLD_COUNT] = [40.0, 80.0, 180.0, 280.0, 400.0];
const SO2: [f64; THRESHOLD_COUNT] = [40.0, 80.0, 380.0, 800.0, 1600.0];
const CO: [f64; THRESHOLD_COUNT] = [1.0, 2.0, 10.0, 17.0, 34.0];
const O3: [f64; THRESHOLD_COUNT] = [50.0, 100.0, 168.0, 208.0, 748.0];
const NH3: [f64; THRESHOLD_COUNT] = [200.0, 400.0, 800.0, 1200.0, 1800.0];
const PB: [f64; THRESHOLD_COUNT] = [0.5, 1.0, 2.0, 3.0, 5.0];

/// Concentration thresholds for a pollutant, ascending.
#[must_use]
pub fn thresholds(pollutant: Pollutant) -> &'static [f64; THRESHOLD_COUNT] {
    match pollutant {
        Pollutant::Pm10 => &PM10,
        Pollutant::Pm25 => &PM25,
        Pollutant::No2 => &NO2,
        Pollutant::So2 => &SO2,
        Pollutant::Co => &CO,
        Pollutant::O3 => &O3,
        Pollutant::Nh3 => &NH3,
        Pollutant::Pb => &PB,
    }
}

/// Compute the sub-index of a concentration.
///
/// Concentrations are expected to be non-negative; that is the caller's
/// responsibility.
#[must_use]
pub fn sub_index(pollutant: Pollutant, concentration: f64) -> f64 {
    let table = thresholds(pollutant);

    for (i, &upper_c) in table.iter().enumerate() {
        if concentration <= upper_c {
            let lower_c = if i == 0 { 0.0 } else { table[i - 1] };
            let lower_i = INDEX_BREAKPOINTS[i];
            let upper_i = INDEX_BREAKPOINTS[i + 1];
            return lower_i + (concentration - lower_c) * (upper_i - lower_i) / (upper_c - lower_c);
        }
    }

    MAX_INDEX
}

/// Compute the sub-index for a pollutant given by its wire identifier.
///
/// # Errors
///
/// Returns [`Error::UnknownPollutant`](crate::Error::UnknownPollutant) if the
/// identifier has no breakpoint table.
pub fn sub_index_for(id: &str, concentration: f64) -> Result<f64> {
    let pollutant: Pollutant = id.parse()?;
    Ok(sub_index(pollutant, concentration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_tables_strictly_increasing() {
        for p in Pollutant::ALL {
            let t = thresholds(p);
            assert!(t[0] > 0.0, "{p} first threshold must be positive");
            for w in t.windows(2) {
                assert!(w[0] < w[1], "{p} thresholds must increase: {t:?}");
            }
        }
        for w in INDEX_BREAKPOINTS.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert_eq!(THRESHOLD_COUNT + 2, INDEX_BREAKPOINTS.len());
    }

    #[test]
    fn test_exact_thresholds_hit_index_breakpoints() {
        for p in Pollutant::ALL {
            for (i, &c) in thresholds(p).iter().enumerate() {
                assert_eq!(
                    sub_index(p, c),
                    INDEX_BREAKPOINTS[i + 1],
                    "{p} at {c} should map to {}",
                    INDEX_BREAKPOINTS[i + 1]
                );
            }
        }
    }

    #[test]
    fn test_pm10_reference_points() {
        assert_eq!(sub_index(Pollutant::Pm10, 0.0), 0.0);
        assert_eq!(sub_index(Pollutant::Pm10, 50.0), 50.0);
        assert_eq!(sub_index(Pollutant::Pm10, 100.0), 75.0);
        assert_eq!(sub_index(Pollutant::Pm10, 150.0), 100.0);
        assert_eq!(sub_index(Pollutant::Pm10, 200.0), 150.0);
    }

    #[test]
    fn test_interpolates_within_segment() {
        // CO: (1, 2] maps onto (50, 100]
        assert!((sub_index(Pollutant::Co, 1.5) - 75.0).abs() < 1e-9);
        // Pb: (3, 5] maps onto (300, 400]
        assert!((sub_index(Pollutant::Pb, 4.0) - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_above_last_threshold() {
        // The last threshold maps to 400, the next step is straight to 500
        assert_eq!(sub_index(Pollutant::Pm10, 430.0), 400.0);
        assert_eq!(sub_index(Pollutant::Pm10, 430.1), MAX_INDEX);
        assert_eq!(sub_index(Pollutant::Pm10, 10_000.0), MAX_INDEX);
        assert_eq!(sub_index(Pollutant::So2, f64::MAX), MAX_INDEX);
    }

    #[test]
    fn test_sub_index_for_known_and_unknown() {
        assert_eq!(sub_index_for("PM25", 60.0), Ok(50.0));
        assert_eq!(
            sub_index_for("CO2", 400.0),
            Err(Error::UnknownPollutant("CO2".to_string()))
        );
        assert!(sub_index_for("", 1.0).is_err());
    }
}

/// Property-based tests for the interpolator.
///
/// # Test Categories
///
/// - `sub_index_monotonic`: higher concentration never lowers the index
/// - `sub_index_in_range`: results stay within `[0, 500]`
/// - `sub_index_clamped_beyond_table`: everything past the table is exactly 500
///
/// # Running Tests
///
/// ```bash
/// cargo test -p aqi-core breakpoints::proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_pollutant() -> impl Strategy<Value = Pollutant> {
        proptest::sample::select(Pollutant::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn sub_index_monotonic(p in any_pollutant(), a in 0.0f64..5_000.0, b in 0.0f64..5_000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(sub_index(p, lo) <= sub_index(p, hi));
        }

        #[test]
        fn sub_index_in_range(p in any_pollutant(), c in 0.0f64..1.0e9) {
            let v = sub_index(p, c);
            prop_assert!((0.0..=MAX_INDEX).contains(&v));
        }

        #[test]
        fn sub_index_clamped_beyond_table(p in any_pollutant(), excess in 1.0e-6f64..1.0e9) {
            let last = thresholds(p)[THRESHOLD_COUNT - 1];
            prop_assert_eq!(sub_index(p, last + excess), MAX_INDEX);
        }
    }
}
