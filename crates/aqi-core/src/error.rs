//! Error types for aqi-core.
//!
//! # Error Classification
//!
//! | Error Type | History mutated? | Caller action |
//! |------------|------------------|---------------|
//! | [`Error::InvalidReading`] | No | Reject the reading as a client error |
//! | [`Error::UnknownPollutant`] | Possibly, for pollutants before the unknown one | Reject the reading as a client error |
//! | [`Error::InvalidConfig`] | No | Fix configuration and restart |
//!
//! A reading is validated in full before anything is recorded, so
//! [`Error::InvalidReading`] never leaves partial state behind. Sub-indices are
//! computed and recorded one pollutant at a time, so an unsupported pollutant
//! is only discovered when the engine reaches it; pollutants ahead of it in the
//! reading have already been folded into history. Nothing is retried inside the
//! engine.

use thiserror::Error;

/// Errors that can occur while computing an index.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The reading is missing its location or pollutants, or carries
    /// non-numeric values.
    #[error("Sensor data is missing or invalid: {0}")]
    InvalidReading(String),

    /// The pollutant identifier has no breakpoint table.
    #[error("Invalid pollutant: {0}")]
    UnknownPollutant(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an invalid reading error.
    pub fn invalid_reading(reason: impl Into<String>) -> Self {
        Self::InvalidReading(reason.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidReading(_) | Error::UnknownPollutant(_))
    }
}

impl From<aqi_types::ParseError> for Error {
    fn from(err: aqi_types::ParseError) -> Self {
        match err {
            aqi_types::ParseError::UnknownPollutant(id) => Error::UnknownPollutant(id),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidReading(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using aqi-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
