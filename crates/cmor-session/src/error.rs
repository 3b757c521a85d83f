//! Error types for the output session.

use cmip_common::{AxisError, TimeError};
use thiserror::Error;

use crate::session::SessionState;

/// Errors raised by the output session and artifact writers.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation not allowed in the current lifecycle state.
    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Schema table missing or malformed.
    #[error("cannot load schema table '{table}': {reason}")]
    SchemaLoad { table: String, reason: String },

    /// Run metadata missing or malformed.
    #[error("cannot load run metadata {path}: {reason}")]
    MetadataLoad { path: String, reason: String },

    /// Name not defined by the loaded table.
    #[error("'{entry}' is not defined in {table}")]
    UnknownTableEntry { table: String, entry: String },

    /// Handle not issued by this session (or already closed).
    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("variable '{0}' already registered in this session")]
    DuplicateVariable(String),

    #[error("variable '{variable}': units '{actual}' differ from table units '{expected}'")]
    UnitsMismatch {
        variable: String,
        expected: String,
        actual: String,
    },

    /// Axes do not match what the table declares for the variable.
    #[error("variable '{variable}': {reason}")]
    AxisMismatch { variable: String, reason: String },

    #[error("variable '{variable}': slice shape {actual:?} does not match axes {expected:?}")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Time values must increase strictly within one variable.
    #[error("variable '{variable}': time {value} not after previous {previous}")]
    OutOfOrder {
        variable: String,
        previous: f64,
        value: f64,
    },

    /// Time stamp present/absent contrary to the variable's axes.
    #[error("variable '{variable}': {reason}")]
    TimeStamp { variable: String, reason: String },

    #[error(transparent)]
    Axis(#[from] AxisError),

    #[error(transparent)]
    Time(#[from] TimeError),

    /// Artifact writer failure.
    #[error("write failed for {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn schema_load(table: impl Into<String>, reason: impl ToString) -> Self {
        Self::SchemaLoad {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    pub fn metadata_load(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::MetadataLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unknown_entry(table: impl Into<String>, entry: impl Into<String>) -> Self {
        Self::UnknownTableEntry {
            table: table.into(),
            entry: entry.into(),
        }
    }

    pub fn write(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
