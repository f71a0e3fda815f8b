//! Windowed multi-pollutant air quality index engine.
//!
//! This crate turns raw pollutant concentrations from distributed sensors into
//! air quality index values, smoothed over a trailing time window, both per
//! sensor location and for the region as a whole.
//!
//! # Features
//!
//! - **Breakpoint interpolation**: piecewise-linear sub-index per pollutant,
//!   clamped to 500 past the last table entry
//! - **Windowed history**: per-location and overall sub-index samples, evicted
//!   on write once they fall out of the window (five minutes by default)
//! - **Aggregation**: the highest windowed average wins, ties go to the
//!   pollutant reported first
//! - **Concurrent ingestion**: independent locks per scope and pollutant
//! - **Injectable clock**: deterministic window behavior under test
//!
//! # Supported Pollutants
//!
//! | Identifier | Thresholds (index 50 / 100 / 200 / 300 / 400) |
//! |------------|-----------------------------------------------|
//! | PM10 | 50, 150, 250, 350, 430 |
//! | PM25 | 60, 120, 250, 350, 500 |
//! | NO2 | 40, 80, 180, 280, 400 |
//! | SO2 | 40, 80, 380, 800, 1600 |
//! | CO | 1, 2, 10, 17, 34 |
//! | O3 | 50, 100, 168, 208, 748 |
//! | NH3 | 200, 400, 800, 1200, 1800 |
//! | Pb | 0.5, 1, 2, 3, 5 |
//!
//! # Quick Start
//!
//! ```
//! use aqi_core::{AqiCalculator, Pollutant, SensorReading};
//!
//! let calculator = AqiCalculator::new();
//!
//! let reading = SensorReading::new(28.6139, 77.2090)
//!     .with_name("New Delhi")
//!     .with_pollutant("PM10", 150.0)
//!     .with_pollutant("PM25", 60.0);
//!
//! let result = calculator.calculate_final_aqi(&reading)?;
//! assert_eq!(result.aqi(), Some(100.0));
//! assert_eq!(result.worst_pollutant(), Some(Pollutant::Pm10));
//! assert_eq!(result.overall.aqi, Some(100.0));
//! # Ok::<(), aqi_core::Error>(())
//! ```

pub mod breakpoints;
pub mod calculator;
pub mod clock;
pub mod error;
pub mod history;
pub mod metrics;

// Core exports
pub use calculator::AqiCalculator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use history::{
    DEFAULT_WINDOW, HistoryStore, MAX_WINDOW, PollutantSnapshot, RecordOutcome, ScopeKey,
    ScopeSnapshot, SubIndexSample,
};
pub use metrics::{EngineMetrics, EngineStats};

/// Type alias for a calculator shared between request handlers.
pub type SharedCalculator = std::sync::Arc<AqiCalculator>;

// Re-export from aqi-types
pub use aqi_types::{
    AqiCategory, AqiResult, Pollutant, PollutantConcentrations, REQUIRED_POLLUTANTS, ScopeAqi,
    SensorReading,
};
