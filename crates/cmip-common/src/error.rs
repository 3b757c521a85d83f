//! Error types for the shared pipeline types.

use thiserror::Error;

use crate::axis::StoredDirection;

/// Coordinate or bounds arrays that disagree with the axis definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    #[error("axis '{axis}': {bounds} bound pairs for {values} coordinate values")]
    BoundsLength {
        axis: String,
        values: usize,
        bounds: usize,
    },

    #[error("axis '{axis}': values must be {direction}, violated at index {index}")]
    NotMonotonic {
        axis: String,
        direction: StoredDirection,
        index: usize,
    },

    #[error("axis '{0}' requires cell bounds")]
    MissingBounds(String),

    #[error("axis '{0}' has no coordinate values")]
    Empty(String),

    #[error("axis '{0}' supplied more than once")]
    Duplicate(String),

    #[error("axis '{axis}': non-finite value at index {index}")]
    NonFinite { axis: String, index: usize },
}

/// Failures parsing CF time units or timestamps.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeError {
    #[error("invalid time units: {0}")]
    InvalidUnits(String),

    #[error("unsupported calendar: {0}")]
    UnsupportedCalendar(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Required raw inputs that cannot be resolved to existing files.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RawInputError {
    #[error("no input files found for {}", keys.join(", "))]
    Missing { keys: Vec<String> },
}
