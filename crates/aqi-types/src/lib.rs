//! Shared types for multi-pollutant air quality index computation.
//!
//! This crate provides the data model used by both the index engine
//! (aqi-core) and the ingestion service (aqi-service).
//!
//! # Features
//!
//! - The closed set of supported pollutants and their wire identifiers
//! - Raw sensor readings with order-preserving pollutant maps
//! - Per-scope and combined index results
//! - Health categories for index values
//!
//! # Example
//!
//! ```
//! use aqi_types::{AqiCategory, Pollutant, SensorReading};
//!
//! let reading = SensorReading::new(28.6, 77.2).with_pollutant("PM25", 60.0);
//! assert_eq!(Pollutant::ALL.len(), 8);
//! assert_eq!(AqiCategory::from_aqi(50.0), AqiCategory::Good);
//! # let _ = reading;
//! ```

pub mod error;
pub mod result;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use result::{AqiResult, ScopeAqi};
pub use types::{
    AqiCategory, Pollutant, PollutantConcentrations, REQUIRED_POLLUTANTS, SensorReading,
};
