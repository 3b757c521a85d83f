//! Error types for masking and remapping.

use netcdf_parser::NetCdfError;
use thiserror::Error;

/// Errors that can occur while loading meshes/mappings or remapping.
#[derive(Error, Debug)]
pub enum RemapError {
    /// Underlying dataset could not be read.
    #[error(transparent)]
    Read(#[from] NetCdfError),

    /// Mesh file lacks a field the operation needs.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Mapping file is malformed.
    #[error("invalid mapping matrix: {0}")]
    InvalidMatrix(String),

    /// Field size disagrees with mesh, mask or matrix dimensions.
    #[error("{what}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RemapError {
    pub fn invalid_mesh(msg: impl Into<String>) -> Self {
        Self::InvalidMesh(msg.into())
    }

    pub fn invalid_matrix(msg: impl Into<String>) -> Self {
        Self::InvalidMatrix(msg.into())
    }

    pub fn shape_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

/// Result type alias for remap operations.
pub type Result<T> = std::result::Result<T, RemapError>;
