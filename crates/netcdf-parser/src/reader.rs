//! Dataset reader abstraction.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{NetCdfError, NetCdfResult};

/// Reads variables from raw model files.
///
/// Implementations must be usable behind `&dyn DatasetReader` so handlers
/// can be exercised against in-memory fixtures.
pub trait DatasetReader: Send + Sync {
    /// Read `names` (every variable if empty) from one file.
    fn read(&self, path: &Path, names: &[&str]) -> NetCdfResult<Dataset>;

    /// Read whichever of `names` exist in one file. Dimensions are always
    /// returned; only a file that cannot be opened is an error.
    fn read_available(&self, path: &Path, names: &[&str]) -> NetCdfResult<Dataset> {
        match self.read(path, names) {
            Err(NetCdfError::MissingVariable { .. }) => {}
            other => return other,
        }

        let mut merged: Option<Dataset> = None;
        for name in names {
            match self.read(path, &[*name]) {
                Ok(part) => match merged.as_mut() {
                    None => merged = Some(part),
                    Some(ds) => {
                        for (_, var) in part.variables {
                            ds.insert(var)?;
                        }
                    }
                },
                Err(NetCdfError::MissingVariable { .. }) => {
                    debug!(path = %path.display(), variable = name, "Optional variable absent");
                }
                Err(e) => return Err(e),
            }
        }

        match merged {
            Some(ds) => Ok(ds),
            None => {
                let mut ds = self.read(path, &[])?;
                ds.variables.clear();
                Ok(ds)
            }
        }
    }

    /// Read `names` from each file in order and concatenate the results
    /// along the record dimension.
    fn read_series(&self, paths: &[PathBuf], names: &[&str]) -> NetCdfResult<Dataset> {
        if paths.is_empty() {
            return Err(NetCdfError::InvalidFormat("empty file series".to_string()));
        }
        let mut parts = Vec::with_capacity(paths.len());
        for path in paths {
            debug!(path = %path.display(), "Reading series part");
            parts.push(self.read(path, names)?);
        }
        Dataset::concat(parts)
    }
}
