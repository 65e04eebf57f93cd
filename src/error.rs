//! Error types for Synheart Rhythm

use thiserror::Error;

/// Errors that can occur at the parsing, validation and encoding boundaries.
///
/// The core computations (segmentation, need, debt, curve) are total and never
/// return these.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid activity sample: {0}")]
    InvalidSample(String),

    #[error("Invalid sleep session: {0}")]
    InvalidSession(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
