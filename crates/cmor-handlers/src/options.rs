//! Per-invocation handler options.

use std::path::PathBuf;

use mesh_remap::RemapConfig;
use serde::{Deserialize, Serialize};

/// Options shared by every handler of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerOptions {
    /// Write gridded and fixed variables directly, bypassing the output
    /// session. Ignored by mesh handlers.
    pub simple: bool,

    /// Directory for per-variable session logs. Defaults to `cmor_logs`
    /// beside the output.
    pub log_directory: Option<PathBuf>,

    pub remap: RemapConfig,
}

impl HandlerOptions {
    /// Options with the remap section taken from the environment.
    pub fn from_env() -> Self {
        Self {
            remap: RemapConfig::from_env(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.remap.validate()
    }
}
