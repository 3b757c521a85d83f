//! Shared setup for handler integration tests: schema tables and run
//! metadata on disk, raw inputs served from memory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use cmip_common::RawVariableSet;
use cmor_handlers::{HandlerOptions, HandlerRequest};
use cmor_session::{CmorSession, MemoryStore, MemoryWriterFactory};
use netcdf_parser::{Dataset, MemoryReader};
use tempfile::TempDir;

pub struct Workspace {
    pub dir: TempDir,
    pub schema_root: PathBuf,
    pub metadata: PathBuf,
    pub output_root: PathBuf,
    pub raw: RawVariableSet,
    pub reader: MemoryReader,
    pub writers: MemoryWriterFactory,
    pub options: HandlerOptions,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_writers(MemoryWriterFactory::new())
    }

    pub fn with_writers(writers: MemoryWriterFactory) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let output_root = dir.path().join("out");
        let schema_root = test_utils::write_schema_tables(dir.path());
        let metadata = test_utils::write_run_metadata(dir.path(), &output_root);
        Self {
            dir,
            schema_root,
            metadata,
            output_root,
            raw: RawVariableSet::new(),
            reader: MemoryReader::new(),
            writers,
            options: HandlerOptions::default(),
        }
    }

    /// Register `dataset` as file `name` under raw-input `key`. An empty
    /// file is created so the key resolves.
    pub fn add(&mut self, key: &str, name: &str, dataset: Dataset) -> PathBuf {
        let path = test_utils::touch(self.dir.path(), name);
        self.reader.insert(path.clone(), dataset);
        self.raw.insert(key, path.clone());
        path
    }

    pub fn request(&self) -> HandlerRequest<'_> {
        HandlerRequest {
            raw_inputs: &self.raw,
            schema_root: &self.schema_root,
            metadata_path: &self.metadata,
            output_root: None,
            options: &self.options,
            reader: &self.reader,
            writers: &self.writers,
        }
    }

    pub fn session(&self) -> CmorSession {
        CmorSession::new(Arc::new(self.writers.clone()))
    }

    pub fn store(&self) -> MemoryStore {
        self.writers.store()
    }
}

pub fn file_name(path: &std::path::Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
