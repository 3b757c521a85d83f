//! Artifact writers.
//!
//! An [`ArtifactSpec`] fully describes one output file: where it goes,
//! its axes, its attributes. Writers receive slices in time order and
//! produce the final file on [`ArtifactWriter::finish`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use cmip_common::{AxisDescriptor, TimeSlice};

use crate::error::{Result, SessionError};

/// A dimension of the output variable.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputAxis {
    /// Dimension and coordinate variable name (`lat`, `lev`, `time`).
    pub name: String,
    pub descriptor: AxisDescriptor,
    pub attributes: BTreeMap<String, String>,
}

/// Singleton coordinate such as `height = 2 m`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarCoordinate {
    pub name: String,
    pub value: f64,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSpec {
    /// Output variable name.
    pub variable: String,
    pub directory: PathBuf,
    pub file_stem: String,
    /// In output order; time, when present, is first.
    pub axes: Vec<OutputAxis>,
    pub scalars: Vec<ScalarCoordinate>,
    pub variable_attributes: BTreeMap<String, String>,
    pub global_attributes: BTreeMap<String, String>,
    pub fill_value: f64,
}

impl ArtifactSpec {
    pub fn has_time(&self) -> bool {
        self.axes.first().is_some_and(|a| a.descriptor.is_time())
    }

    /// Spatial axes, excluding time.
    pub fn spatial_axes(&self) -> impl Iterator<Item = &OutputAxis> {
        self.axes.iter().filter(|a| !a.descriptor.is_time())
    }

    /// Expected shape of one slice.
    pub fn slice_shape(&self) -> Vec<usize> {
        self.spatial_axes()
            .map(|a| a.descriptor.coord_vals().len())
            .collect()
    }

    pub fn file_name(&self, time_range: Option<&str>) -> String {
        match time_range {
            Some(range) => format!("{}_{range}.nc", self.file_stem),
            None => format!("{}.nc", self.file_stem),
        }
    }

    pub fn final_path(&self, time_range: Option<&str>) -> PathBuf {
        self.directory.join(self.file_name(time_range))
    }

    /// Hidden name written to until the artifact is finalized.
    pub fn staging_path(&self) -> PathBuf {
        self.directory.join(format!(".{}.nc.partial", self.file_stem))
    }
}

/// Sink for one output variable.
pub trait ArtifactWriter {
    fn begin(&mut self, spec: &ArtifactSpec) -> Result<()>;

    /// Append slice `index` (0-based along time).
    fn write_slice(&mut self, index: usize, slice: &TimeSlice) -> Result<()>;

    /// Finalize under the name carrying `time_range`, replacing any
    /// existing file, and return its path.
    fn finish(&mut self, time_range: Option<&str>) -> Result<PathBuf>;
}

/// Creates a fresh writer per variable.
pub trait WriterFactory: Send + Sync {
    fn writer(&self) -> Box<dyn ArtifactWriter>;
}

/// A finalized in-memory artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryArtifact {
    pub spec: ArtifactSpec,
    pub slices: Vec<TimeSlice>,
    pub path: PathBuf,
}

/// Finalized artifacts shared between a factory and the test inspecting it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: Arc<Mutex<Vec<MemoryArtifact>>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Vec<MemoryArtifact>> {
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn artifacts(&self) -> Vec<MemoryArtifact> {
        self.lock().clone()
    }

    /// Latest artifact for `variable`.
    pub fn get(&self, variable: &str) -> Option<MemoryArtifact> {
        self.lock().iter().rev().find(|a| a.spec.variable == variable).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, artifact: MemoryArtifact) {
        let mut artifacts = self.lock();
        artifacts.retain(|a| a.path != artifact.path);
        artifacts.push(artifact);
    }
}

/// Writer factory that keeps artifacts in a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryWriterFactory {
    store: MemoryStore,
    fail_at: Option<usize>,
    fail_finish: bool,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers that fail when asked for slice `index`.
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    /// Writers whose `finish` fails and stores nothing.
    pub fn with_failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }
}

impl WriterFactory for MemoryWriterFactory {
    fn writer(&self) -> Box<dyn ArtifactWriter> {
        Box::new(MemoryArtifactWriter {
            store: self.store.clone(),
            fail_at: self.fail_at,
            fail_finish: self.fail_finish,
            spec: None,
            slices: Vec::new(),
        })
    }
}

struct MemoryArtifactWriter {
    store: MemoryStore,
    fail_at: Option<usize>,
    fail_finish: bool,
    spec: Option<ArtifactSpec>,
    slices: Vec<TimeSlice>,
}

impl MemoryArtifactWriter {
    fn spec(&self) -> Result<&ArtifactSpec> {
        self.spec
            .as_ref()
            .ok_or_else(|| SessionError::write("<memory>", "writer used before begin"))
    }
}

impl ArtifactWriter for MemoryArtifactWriter {
    fn begin(&mut self, spec: &ArtifactSpec) -> Result<()> {
        self.spec = Some(spec.clone());
        self.slices.clear();
        Ok(())
    }

    fn write_slice(&mut self, index: usize, slice: &TimeSlice) -> Result<()> {
        let path = self.spec()?.staging_path();
        if self.fail_at == Some(index) {
            return Err(SessionError::write(path.display().to_string(), format!("injected failure at slice {index}")));
        }
        if index != self.slices.len() {
            return Err(SessionError::write(
                path.display().to_string(),
                format!("slice {index} written out of sequence"),
            ));
        }
        self.slices.push(slice.clone());
        Ok(())
    }

    fn finish(&mut self, time_range: Option<&str>) -> Result<PathBuf> {
        let spec = self.spec()?.clone();
        if self.fail_finish {
            return Err(SessionError::write(
                spec.staging_path().display().to_string(),
                "injected failure at finish",
            ));
        }
        let path = spec.final_path(time_range);
        self.store.push(MemoryArtifact {
            spec,
            slices: std::mem::take(&mut self.slices),
            path: path.clone(),
        });
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmip_common::TimeStamp;

    fn spec() -> ArtifactSpec {
        let time = AxisDescriptor::time("days since 1850-01-01");
        let lat = AxisDescriptor::new("latitude", "degrees_north", vec![-45.0, 45.0], Some(vec![[-90.0, 0.0], [0.0, 90.0]])).unwrap();
        ArtifactSpec {
            variable: "tas".into(),
            directory: PathBuf::from("/out/tas"),
            file_stem: "tas_Amon_E3SM-1-0_piControl_r1i1p1f1_gr".into(),
            axes: vec![
                OutputAxis {
                    name: "time".into(),
                    descriptor: time,
                    attributes: BTreeMap::new(),
                },
                OutputAxis {
                    name: "lat".into(),
                    descriptor: lat,
                    attributes: BTreeMap::new(),
                },
            ],
            scalars: Vec::new(),
            variable_attributes: BTreeMap::new(),
            global_attributes: BTreeMap::new(),
            fill_value: 1.0e20,
        }
    }

    fn slice(t: f64) -> TimeSlice {
        TimeSlice::timed(TimeStamp::new(t, [t - 1.0, t + 1.0]), vec![2], vec![280.0, 281.0])
    }

    #[test]
    fn test_spec_paths() {
        let spec = spec();
        assert!(spec.has_time());
        assert_eq!(spec.slice_shape(), vec![2]);
        assert_eq!(
            spec.final_path(Some("185001-185003")),
            PathBuf::from("/out/tas/tas_Amon_E3SM-1-0_piControl_r1i1p1f1_gr_185001-185003.nc")
        );
        assert_eq!(spec.file_name(None), "tas_Amon_E3SM-1-0_piControl_r1i1p1f1_gr.nc");
        assert!(spec.staging_path().starts_with("/out/tas"));
    }

    #[test]
    fn test_memory_writer_roundtrip() {
        let factory = MemoryWriterFactory::new();
        let mut writer = factory.writer();
        writer.begin(&spec()).unwrap();
        writer.write_slice(0, &slice(15.5)).unwrap();
        writer.write_slice(1, &slice(45.0)).unwrap();
        let path = writer.finish(Some("185001-185002")).unwrap();

        let artifact = factory.store().get("tas").unwrap();
        assert_eq!(artifact.path, path);
        assert_eq!(artifact.slices.len(), 2);
    }

    #[test]
    fn test_memory_writer_injected_failure() {
        let factory = MemoryWriterFactory::failing_at(1);
        let mut writer = factory.writer();
        writer.begin(&spec()).unwrap();
        writer.write_slice(0, &slice(15.5)).unwrap();
        assert!(matches!(writer.write_slice(1, &slice(45.0)), Err(SessionError::Write { .. })));
        writer.finish(None).unwrap();
        assert_eq!(factory.store().get("tas").unwrap().slices.len(), 1);
    }

    #[test]
    fn test_write_before_begin() {
        let factory = MemoryWriterFactory::new();
        let mut writer = factory.writer();
        assert!(writer.write_slice(0, &slice(1.0)).is_err());
        assert!(factory.store().is_empty());
    }
}
