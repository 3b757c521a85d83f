//! Error types for dataset reading.

use std::path::Path;

use thiserror::Error;

/// Result type for dataset operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for dataset reading and manipulation.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// File could not be opened as a dataset
    #[error("cannot open {path}: {message}")]
    Open { path: String, message: String },

    /// Requested variable is not in the file
    #[error("variable '{name}' not found in {path}")]
    MissingVariable { path: String, name: String },

    /// Requested dimension is not in the dataset
    #[error("dimension '{0}' not found")]
    MissingDimension(String),

    /// Reading a variable's values failed
    #[error("failed to read '{name}': {message}")]
    Read { name: String, message: String },

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Array length disagrees with its declared shape
    #[error("variable '{name}': shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        name: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// The native reader was not compiled in
    #[error("netCDF support not enabled (build with feature 'netcdf')")]
    FeatureDisabled,
}

impl NetCdfError {
    pub fn open(path: &Path, message: impl ToString) -> Self {
        Self::Open {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn missing_variable(path: &Path, name: &str) -> Self {
        Self::MissingVariable {
            path: path.display().to_string(),
            name: name.to_string(),
        }
    }

    pub fn read(name: &str, message: impl ToString) -> Self {
        Self::Read {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}
