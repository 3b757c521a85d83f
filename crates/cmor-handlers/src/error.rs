//! Error types for handlers and the registry.

use cmip_common::{AxisError, TimeError};
use cmor_session::SessionError;
use mesh_remap::RemapError;
use netcdf_parser::NetCdfError;
use thiserror::Error;

/// Errors that abort a handler invocation.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A required raw input did not resolve to an existing file. Raised
    /// before any session call.
    #[error("{variable}: missing raw input {key}")]
    MissingInput { variable: String, key: String },

    /// Raw data present but unusable (missing coordinate, wrong layout).
    #[error("{variable}: {reason}")]
    InvalidInput { variable: String, reason: String },

    #[error("{variable}: derivation failed: {reason}")]
    Derivation { variable: String, reason: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Axis(#[from] AxisError),

    #[error(transparent)]
    Remap(#[from] RemapError),

    #[error(transparent)]
    Read(#[from] NetCdfError),

    #[error(transparent)]
    Time(#[from] TimeError),
}

impl HandlerError {
    pub fn invalid_input(variable: &str, reason: impl ToString) -> Self {
        Self::InvalidInput {
            variable: variable.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn derivation(variable: &str, reason: impl ToString) -> Self {
        Self::Derivation {
            variable: variable.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure happened before any output-side work.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput { .. })
    }
}

/// Errors raised by [`crate::HandlerRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler for variable '{0}'")]
    UnknownVariable(String),

    #[error("no handlers for variables: {}", .0.join(", "))]
    UnknownVariables(Vec<String>),
}

/// Errors raised while scanning an input directory.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("input directory {0} does not exist")]
    NotADirectory(String),

    #[error("failed to scan {path}: {message}")]
    Scan { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, HandlerError>;
