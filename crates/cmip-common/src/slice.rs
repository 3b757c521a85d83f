//! Streaming write units.

use serde::{Deserialize, Serialize};

/// Time coordinate of one slice, in the units of the variable's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStamp {
    pub value: f64,
    pub bounds: [f64; 2],
}

impl TimeStamp {
    pub fn new(value: f64, bounds: [f64; 2]) -> Self {
        Self { value, bounds }
    }

    /// Stamp at the midpoint of `bounds`.
    pub fn midpoint(bounds: [f64; 2]) -> Self {
        Self::new(0.5 * (bounds[0] + bounds[1]), bounds)
    }
}

/// One write unit: the data for a single time step (or the single record of
/// a fixed variable), row-major over the non-time axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    pub time: Option<TimeStamp>,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TimeSlice {
    pub fn timed(time: TimeStamp, shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            time: Some(time),
            shape,
            data,
        }
    }

    pub fn fixed(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            time: None,
            shape,
            data,
        }
    }

    /// Whether `data` holds exactly as many values as `shape` describes.
    pub fn is_consistent(&self) -> bool {
        self.shape.iter().product::<usize>() == self.data.len()
    }
}
