//! In-memory reader used for tests and synthetic inputs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::{NetCdfError, NetCdfResult};
use crate::reader::DatasetReader;

/// Serves pre-built datasets keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Dataset>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, dataset: Dataset) {
        self.files.insert(path.into(), dataset);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, dataset: Dataset) -> Self {
        self.insert(path, dataset);
        self
    }
}

impl DatasetReader for MemoryReader {
    fn read(&self, path: &Path, names: &[&str]) -> NetCdfResult<Dataset> {
        let dataset = self
            .files
            .get(path)
            .ok_or_else(|| NetCdfError::open(path, "no such dataset"))?;

        for name in names {
            if !dataset.has_variable(name) {
                return Err(NetCdfError::missing_variable(path, name));
            }
        }

        Ok(dataset.clone().select(names))
    }
}
