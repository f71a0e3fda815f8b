//! Error types for data parsing in aqi-types.

use thiserror::Error;

/// Errors that can occur when interpreting pollutant data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The pollutant identifier is not one of the supported pollutants.
    #[error("Invalid pollutant: {0}")]
    UnknownPollutant(String),
}

/// Result type alias using aqi-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
