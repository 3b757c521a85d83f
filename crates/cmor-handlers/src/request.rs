//! Handler inputs and results.

use std::path::{Path, PathBuf};

use cmip_common::RawVariableSet;
use cmor_session::{SessionConfig, WriterFactory};
use mesh_remap::RemapReport;
use netcdf_parser::DatasetReader;
use serde::Serialize;

use crate::options::HandlerOptions;

/// Directory name for session logs when no log directory is configured.
pub const DEFAULT_LOG_DIR: &str = "cmor_logs";

/// Everything a handler needs for one invocation.
#[derive(Clone, Copy)]
pub struct HandlerRequest<'a> {
    pub raw_inputs: &'a RawVariableSet,
    pub schema_root: &'a Path,
    pub metadata_path: &'a Path,
    /// Overrides the run metadata `outpath`.
    pub output_root: Option<&'a Path>,
    pub options: &'a HandlerOptions,
    pub reader: &'a dyn DatasetReader,
    /// Used by the simple path, which writes without a session.
    pub writers: &'a dyn WriterFactory,
}

impl HandlerRequest<'_> {
    /// Session log location for `variable`.
    pub fn log_path(&self, variable: &str) -> PathBuf {
        let directory = match (&self.options.log_directory, self.output_root) {
            (Some(dir), _) => dir.clone(),
            (None, Some(root)) => root.join(DEFAULT_LOG_DIR),
            (None, None) => PathBuf::from(DEFAULT_LOG_DIR),
        };
        directory.join(format!("{variable}.log"))
    }

    pub fn session_config(&self, variable: &str) -> SessionConfig {
        let config = SessionConfig::new(self.schema_root, self.metadata_path, self.log_path(variable));
        match self.output_root {
            Some(root) => config.with_output_root(root),
            None => config,
        }
    }
}

/// Result of a successful handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerOutcome {
    pub variable: String,
    pub slices_written: usize,
    pub artifacts: Vec<PathBuf>,
    /// Remap counters, for mesh handlers.
    pub coverage: Option<RemapReport>,
}

#[cfg(test)]
mod tests {
    use cmor_session::MemoryWriterFactory;
    use netcdf_parser::MemoryReader;

    use super::*;

    #[test]
    fn test_log_path_resolution() {
        let inputs = RawVariableSet::new();
        let reader = MemoryReader::new();
        let writers = MemoryWriterFactory::new();
        let options = HandlerOptions::default();
        let request = HandlerRequest {
            raw_inputs: &inputs,
            schema_root: Path::new("/tables"),
            metadata_path: Path::new("/meta.json"),
            output_root: Some(Path::new("/out")),
            options: &options,
            reader: &reader,
            writers: &writers,
        };
        assert_eq!(request.log_path("tas"), PathBuf::from("/out/cmor_logs/tas.log"));
        assert_eq!(request.session_config("tas").output_root, Some(PathBuf::from("/out")));

        let logs = HandlerOptions {
            log_directory: Some(PathBuf::from("/logs")),
            ..HandlerOptions::default()
        };
        let request = HandlerRequest {
            options: &logs,
            output_root: None,
            ..request
        };
        assert_eq!(request.log_path("tos"), PathBuf::from("/logs/tos.log"));
    }
}
