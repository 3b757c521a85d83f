//! The output session.
//!
//! A session owns the schema, run metadata and the artifact writers for one
//! handler invocation. Its lifecycle is strictly forward:
//!
//! ```text
//! Uninitialized -> SetUp -> Configured -> AxesRegistered
//!               -> VariableRegistered -> Writing -> Closed
//! ```
//!
//! Only one session may be open per process. [`CmorSession::setup`] takes a
//! process-wide token that is released by [`OutputSession::close`] or when
//! the session is dropped; a second `setup` blocks until then.

use std::fmt;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use cmip_common::{AxisDescriptor, TimeSlice};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::SchemaContext;
use crate::error::{Result, SessionError};
use crate::layout::time_range_label;
use crate::metadata::RunMetadata;
use crate::table::{AxisEntry, CoordinateTable, SchemaTable, COORDINATE_TABLE};
use crate::writer::{ArtifactSpec, ArtifactWriter, WriterFactory};

static SESSION_TOKEN: Mutex<()> = Mutex::new(());
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of an [`OutputSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// Token held and metadata loaded; no table yet.
    SetUp,
    Configured,
    AxesRegistered,
    VariableRegistered,
    Writing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::SetUp => "set_up",
            Self::Configured => "configured",
            Self::AxesRegistered => "axes_registered",
            Self::VariableRegistered => "variable_registered",
            Self::Writing => "writing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Inputs to [`OutputSession::setup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the schema tables (directly or under `Tables/`).
    pub schema_root: PathBuf,
    /// Session log file; replaced if it exists.
    pub log_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Overrides `outpath` from the run metadata.
    #[serde(default)]
    pub output_root: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(schema_root: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_root: schema_root.into(),
            log_path: log_path.into(),
            metadata_path: metadata_path.into(),
            output_root: None,
        }
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }
}

/// Opaque reference to a registered axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisHandle {
    session: u64,
    index: usize,
}

impl AxisHandle {
    /// For [`OutputSession`] implementations.
    pub fn new(session: u64, index: usize) -> Self {
        Self { session, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for AxisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis {}/{}", self.session, self.index)
    }
}

/// Opaque reference to a registered variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableHandle {
    session: u64,
    index: usize,
}

impl VariableHandle {
    /// For [`OutputSession`] implementations.
    pub fn new(session: u64, index: usize) -> Self {
        Self { session, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for VariableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable {}/{}", self.session, self.index)
    }
}

/// The operations a handler performs against the output layer.
pub trait OutputSession {
    fn setup(&mut self, config: &SessionConfig) -> Result<()>;

    fn load_table(&mut self, name: &str) -> Result<()>;

    fn register_axes(&mut self, axes: Vec<AxisDescriptor>) -> Result<Vec<AxisHandle>>;

    fn register_variable(&mut self, name: &str, units: &str, axes: &[AxisHandle]) -> Result<VariableHandle>;

    fn write(&mut self, variable: VariableHandle, slice: TimeSlice) -> Result<()>;

    /// Finalize one variable. Closing twice returns `Ok(None)`.
    fn close_variable(&mut self, variable: VariableHandle) -> Result<Option<PathBuf>>;

    /// Finalize everything and release the session token. Always leaves
    /// the session `Closed`; a second call is a no-op.
    fn close(&mut self) -> Result<Vec<PathBuf>>;

    fn state(&self) -> SessionState;
}

struct SessionToken {
    _guard: MutexGuard<'static, ()>,
}

impl SessionToken {
    fn acquire() -> Self {
        let guard = match SESSION_TOKEN.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Waiting for the open output session to close");
                SESSION_TOKEN.lock().unwrap_or_else(|e| e.into_inner())
            }
        };
        Self { _guard: guard }
    }
}

/// Timestamped session log, replaced on each setup.
struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: File::create(path)?,
        })
    }

    fn record(&mut self, level: &str, message: impl fmt::Display) {
        let line = format!(
            "{} {level:<5} {message}\n",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ")
        );
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "Cannot write session log");
        }
    }
}

struct RegisteredAxis {
    descriptor: AxisDescriptor,
}

struct RegisteredVariable {
    name: String,
    axes: Vec<usize>,
    shape: Vec<usize>,
    has_time: bool,
    frequency: String,
    writer: Option<Box<dyn ArtifactWriter>>,
    slices: usize,
    first_time: Option<f64>,
    last_time: Option<f64>,
    closed: bool,
}

/// Schema-driven [`OutputSession`] writing through a [`WriterFactory`].
pub struct CmorSession {
    id: u64,
    writers: Arc<dyn WriterFactory>,
    state: SessionState,
    token: Option<SessionToken>,
    log: Option<SessionLog>,
    output_root: Option<PathBuf>,
    schema_root: PathBuf,
    metadata: RunMetadata,
    table: Option<SchemaTable>,
    coordinates: CoordinateTable,
    axes: Vec<RegisteredAxis>,
    variables: Vec<RegisteredVariable>,
    artifacts: Vec<PathBuf>,
}

impl CmorSession {
    pub fn new(writers: Arc<dyn WriterFactory>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            writers,
            state: SessionState::Uninitialized,
            token: None,
            log: None,
            output_root: None,
            schema_root: PathBuf::new(),
            metadata: RunMetadata::default(),
            table: None,
            coordinates: CoordinateTable::default(),
            axes: Vec::new(),
            variables: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Session using the netCDF writer.
    #[cfg(feature = "netcdf")]
    pub fn netcdf() -> Self {
        Self::new(Arc::new(crate::netcdf_writer::NetcdfWriterFactory))
    }

    pub fn table(&self) -> Option<&SchemaTable> {
        self.table.as_ref()
    }

    pub fn coordinates(&self) -> &CoordinateTable {
        &self.coordinates
    }

    /// Whether this session holds the process-wide session token.
    pub fn holds_token(&self) -> bool {
        self.token.is_some()
    }

    /// Artifacts finalized so far.
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    fn log(&mut self, level: &str, message: impl fmt::Display) {
        if let Some(log) = self.log.as_mut() {
            log.record(level, message);
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::invalid_state(operation, self.state))
        }
    }

    fn loaded_table(&self) -> Result<&SchemaTable> {
        self.table
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state("table lookup", self.state))
    }

    fn context(&self) -> Result<SchemaContext<'_>> {
        Ok(SchemaContext {
            table: self.loaded_table()?,
            coordinates: &self.coordinates,
            metadata: &self.metadata,
            output_root: self.output_root.as_deref(),
        })
    }

    fn axis_entry(&self, table_entry: &str) -> Result<&AxisEntry> {
        self.coordinates
            .get(table_entry)
            .ok_or_else(|| SessionError::unknown_entry(COORDINATE_TABLE, table_entry))
    }

    fn variable_index(&self, handle: VariableHandle) -> Result<usize> {
        if handle.session != self.id || handle.index >= self.variables.len() {
            return Err(SessionError::UnknownHandle(handle.to_string()));
        }
        Ok(handle.index)
    }

    fn artifact_spec(&self, index: usize) -> Result<ArtifactSpec> {
        let variable = &self.variables[index];
        let axes: Vec<AxisDescriptor> = variable
            .axes
            .iter()
            .map(|&i| self.axes[i].descriptor.clone())
            .collect();
        self.context()?.artifact_spec(&variable.name, &axes)
    }

    fn time_units(&self, index: usize) -> Option<&str> {
        self.variables[index]
            .axes
            .first()
            .map(|&i| &self.axes[i].descriptor)
            .filter(|d| d.is_time())
            .map(AxisDescriptor::units)
    }

    fn finalize(&mut self, index: usize) -> Result<Option<PathBuf>> {
        if self.variables[index].closed {
            return Ok(None);
        }
        self.variables[index].closed = true;

        let range = match (self.variables[index].first_time, self.variables[index].last_time) {
            (Some(first), Some(last)) => self.time_units(index).and_then(|units| {
                time_range_label(
                    &self.variables[index].frequency,
                    units,
                    self.metadata.calendar(),
                    first,
                    last,
                )
            }),
            _ => None,
        };

        let variable = &mut self.variables[index];
        let name = variable.name.clone();
        let slices = variable.slices;
        let Some(mut writer) = variable.writer.take() else {
            warn!(variable = %name, "Variable closed without any slices written");
            self.log("WARN", format_args!("{name}: closed without data"));
            return Ok(None);
        };

        let path = writer.finish(range.as_deref())?;
        info!(variable = %name, slices, path = %path.display(), "Variable closed");
        self.log("INFO", format_args!("{name}: {slices} slices written to {}", path.display()));
        self.artifacts.push(path.clone());
        Ok(Some(path))
    }
}

impl OutputSession for CmorSession {
    fn setup(&mut self, config: &SessionConfig) -> Result<()> {
        self.require("setup", &[SessionState::Uninitialized])?;

        let token = SessionToken::acquire();
        let log = SessionLog::create(&config.log_path)?;
        let metadata = RunMetadata::load(&config.metadata_path)?;

        self.token = Some(token);
        self.log = Some(log);
        self.metadata = metadata;
        self.schema_root = config.schema_root.clone();
        self.output_root = config.output_root.clone();
        self.state = SessionState::SetUp;

        debug!(
            schema_root = %config.schema_root.display(),
            log = %config.log_path.display(),
            "Output session set up"
        );
        self.log("INFO", format_args!("session set up, metadata {}", config.metadata_path.display()));
        Ok(())
    }

    fn load_table(&mut self, name: &str) -> Result<()> {
        self.require("load_table", &[SessionState::SetUp])?;

        let table = SchemaTable::load(&self.schema_root, name)?;
        self.coordinates = CoordinateTable::load(&self.schema_root)?;
        self.log("INFO", format_args!("loaded table {}", table.file_name));
        self.table = Some(table);
        self.state = SessionState::Configured;
        Ok(())
    }

    fn register_axes(&mut self, axes: Vec<AxisDescriptor>) -> Result<Vec<AxisHandle>> {
        self.require(
            "register_axes",
            &[SessionState::Configured, SessionState::AxesRegistered],
        )?;

        for descriptor in &axes {
            let rule = self.axis_entry(descriptor.table_entry())?.rule();
            descriptor.check_rule(&rule)?;
        }

        let mut handles = Vec::with_capacity(axes.len());
        for descriptor in axes {
            self.log(
                "INFO",
                format_args!(
                    "axis {} ({}), {} values",
                    descriptor.table_entry(),
                    descriptor.units(),
                    descriptor.coord_vals().len()
                ),
            );
            handles.push(AxisHandle::new(self.id, self.axes.len()));
            self.axes.push(RegisteredAxis { descriptor });
        }

        self.state = SessionState::AxesRegistered;
        Ok(handles)
    }

    fn register_variable(&mut self, name: &str, units: &str, axes: &[AxisHandle]) -> Result<VariableHandle> {
        if self.state == SessionState::Closed {
            return Err(SessionError::invalid_state("register_variable", self.state));
        }
        if self.variables.iter().any(|v| v.name == name) {
            return Err(SessionError::DuplicateVariable(name.to_string()));
        }
        self.require(
            "register_variable",
            &[SessionState::AxesRegistered, SessionState::VariableRegistered],
        )?;

        let context = self.context()?;
        let table = context.table;
        let entry = table.variable(name)?;
        if entry.units != units {
            return Err(SessionError::UnitsMismatch {
                variable: name.to_string(),
                expected: entry.units.clone(),
                actual: units.to_string(),
            });
        }

        let mut indices = Vec::with_capacity(axes.len());
        for handle in axes {
            if handle.session != self.id || handle.index >= self.axes.len() {
                return Err(SessionError::UnknownHandle(handle.to_string()));
            }
            indices.push(handle.index);
        }

        let mismatch = |reason: String| SessionError::AxisMismatch {
            variable: name.to_string(),
            reason,
        };
        if let Some(pos) = indices.iter().position(|&i| self.axes[i].descriptor.is_time()) {
            if pos != 0 {
                return Err(mismatch(format!("time axis at position {pos}, must be first")));
            }
        }

        let expected = context.axis_dimensions(entry);
        if expected.len() != indices.len() {
            return Err(mismatch(format!(
                "table declares {} axes ({}), {} registered",
                expected.len(),
                expected.join(" "),
                indices.len()
            )));
        }
        let has_time = indices.first().is_some_and(|&i| self.axes[i].descriptor.is_time());
        let table_has_time = expected.iter().any(|d| d.starts_with("time"));
        if has_time != table_has_time {
            return Err(mismatch(if table_has_time {
                "table declares a time axis but none was given".to_string()
            } else {
                "time axis given for a time-invariant variable".to_string()
            }));
        }

        let shape: Vec<usize> = indices
            .iter()
            .filter_map(|&i| self.axes[i].descriptor.len())
            .collect();
        let frequency = table.frequency(entry);

        let handle = VariableHandle::new(self.id, self.variables.len());
        self.variables.push(RegisteredVariable {
            name: name.to_string(),
            axes: indices,
            shape,
            has_time,
            frequency,
            writer: None,
            slices: 0,
            first_time: None,
            last_time: None,
            closed: false,
        });
        self.log("INFO", format_args!("variable {name} ({units}) registered"));
        self.state = SessionState::VariableRegistered;
        Ok(handle)
    }

    fn write(&mut self, variable: VariableHandle, slice: TimeSlice) -> Result<()> {
        self.require("write", &[SessionState::VariableRegistered, SessionState::Writing])?;
        let index = self.variable_index(variable)?;

        {
            let var = &self.variables[index];
            if var.closed {
                return Err(SessionError::UnknownHandle(format!("{variable} ({} is closed)", var.name)));
            }
            if slice.shape != var.shape || !slice.is_consistent() {
                return Err(SessionError::ShapeMismatch {
                    variable: var.name.clone(),
                    expected: var.shape.clone(),
                    actual: slice.shape.clone(),
                });
            }
            let stamp_error = |reason: &str| SessionError::TimeStamp {
                variable: var.name.clone(),
                reason: reason.to_string(),
            };
            match (&slice.time, var.has_time) {
                (None, true) => return Err(stamp_error("time stamp required")),
                (Some(_), false) => return Err(stamp_error("time stamp given for a time-invariant variable")),
                (None, false) if var.slices > 0 => {
                    return Err(stamp_error("time-invariant variable written more than once"))
                }
                (Some(stamp), true) => {
                    if !stamp.value.is_finite() || stamp.bounds.iter().any(|b| !b.is_finite()) {
                        return Err(stamp_error("time value and bounds must be finite"));
                    }
                    if let Some(previous) = var.last_time {
                        if stamp.value <= previous {
                            return Err(SessionError::OutOfOrder {
                                variable: var.name.clone(),
                                previous,
                                value: stamp.value,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        if self.variables[index].writer.is_none() {
            let spec = self.artifact_spec(index)?;
            let mut writer = self.writers.writer();
            writer.begin(&spec)?;
            self.variables[index].writer = Some(writer);
        }

        let var = &mut self.variables[index];
        let slice_index = var.slices;
        if let Some(writer) = var.writer.as_mut() {
            writer.write_slice(slice_index, &slice)?;
        }
        var.slices += 1;
        if let Some(stamp) = slice.time {
            var.first_time.get_or_insert(stamp.value);
            var.last_time = Some(stamp.value);
        }
        self.state = SessionState::Writing;
        Ok(())
    }

    fn close_variable(&mut self, variable: VariableHandle) -> Result<Option<PathBuf>> {
        self.require(
            "close_variable",
            &[SessionState::VariableRegistered, SessionState::Writing],
        )?;
        let index = self.variable_index(variable)?;
        self.finalize(index)
    }

    fn close(&mut self) -> Result<Vec<PathBuf>> {
        if self.state == SessionState::Closed {
            return Ok(self.artifacts.clone());
        }

        let mut first_error = None;
        for index in 0..self.variables.len() {
            if let Err(e) = self.finalize(index) {
                let name = self.variables[index].name.clone();
                warn!(variable = %name, error = %e, "Failed to finalize variable");
                self.log("ERROR", format_args!("{name}: {e}"));
                first_error.get_or_insert(e);
            }
        }

        self.log("INFO", "session closed");
        self.log = None;
        self.token = None;
        self.state = SessionState::Closed;

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.artifacts.clone()),
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for CmorSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "Output session dropped with a failing close");
            }
        }
    }
}

/// Closes its variable when dropped.
///
/// Keeps the "always close, even on error" rule structural: handlers
/// write through the scope and any early return still finalizes what was
/// written.
pub struct VariableScope<'s> {
    session: &'s mut dyn OutputSession,
    handle: VariableHandle,
    closed: bool,
}

impl<'s> VariableScope<'s> {
    pub fn new(session: &'s mut dyn OutputSession, handle: VariableHandle) -> Self {
        Self {
            session,
            handle,
            closed: false,
        }
    }

    pub fn write(&mut self, slice: TimeSlice) -> Result<()> {
        self.session.write(self.handle, slice)
    }

    /// Close explicitly and observe the result.
    pub fn close(mut self) -> Result<Option<PathBuf>> {
        self.closed = true;
        self.session.close_variable(self.handle)
    }
}

impl Drop for VariableScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.session.close_variable(self.handle) {
                warn!(handle = %self.handle, error = %e, "Failed to close variable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cmip_common::{AxisBuilder, TimeStamp};

    use super::*;
    use crate::writer::MemoryWriterFactory;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: SessionConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = test_utils::write_schema_tables(dir.path());
        let metadata = test_utils::write_run_metadata(dir.path(), &dir.path().join("out"));
        let config = SessionConfig::new(root, metadata, dir.path().join("logs").join("tas.log"));
        Fixture { _dir: dir, config }
    }

    fn axes() -> Vec<AxisDescriptor> {
        AxisBuilder::new()
            .time(test_utils::TIME_UNITS)
            .latitude(vec![-45.0, 45.0], Some(vec![[-90.0, 0.0], [0.0, 90.0]]))
            .longitude(vec![90.0, 270.0], Some(vec![[0.0, 180.0], [180.0, 360.0]]))
            .build()
            .unwrap()
    }

    fn slice(t: f64) -> TimeSlice {
        TimeSlice::timed(TimeStamp::new(t, [t - 1.0, t + 1.0]), vec![2, 2], vec![280.0; 4])
    }

    fn registered(factory: &MemoryWriterFactory, fx: &Fixture) -> (CmorSession, VariableHandle) {
        let mut session = CmorSession::new(Arc::new(factory.clone()));
        session.setup(&fx.config).unwrap();
        session.load_table("Amon").unwrap();
        let handles = session.register_axes(axes()).unwrap();
        let var = session.register_variable("tas", "K", &handles).unwrap();
        (session, var)
    }

    #[test]
    fn test_happy_path_states() {
        let fx = fixture();
        let factory = MemoryWriterFactory::new();
        let mut session = CmorSession::new(Arc::new(factory.clone()));
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.setup(&fx.config).unwrap();
        assert_eq!(session.state(), SessionState::SetUp);
        session.load_table("Amon").unwrap();
        assert_eq!(session.state(), SessionState::Configured);
        let handles = session.register_axes(axes()).unwrap();
        assert_eq!(session.state(), SessionState::AxesRegistered);
        let var = session.register_variable("tas", "K", &handles).unwrap();
        assert_eq!(session.state(), SessionState::VariableRegistered);

        for t in [15.5, 45.0, 74.5] {
            session.write(var, slice(t)).unwrap();
        }
        assert_eq!(session.state(), SessionState::Writing);

        assert!(session.holds_token());
        let paths = session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.holds_token());
        assert_eq!(paths.len(), 1);
        assert!(paths[0].to_string_lossy().ends_with("_185001-185003.nc"));

        let artifact = factory.store().get("tas").unwrap();
        assert_eq!(artifact.slices.len(), 3);
        assert!(fx.config.log_path.is_file());
    }

    #[test]
    fn test_write_before_register() {
        let fx = fixture();
        let mut session = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
        session.setup(&fx.config).unwrap();
        session.load_table("Amon").unwrap();
        let err = session.write(VariableHandle::new(session.id, 0), slice(1.0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        session.close().unwrap();
    }

    #[test]
    fn test_no_skipping_states() {
        let fx = fixture();
        let mut session = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
        assert!(matches!(session.load_table("Amon"), Err(SessionError::InvalidState { .. })));
        session.setup(&fx.config).unwrap();
        assert!(matches!(session.register_axes(axes()), Err(SessionError::InvalidState { .. })));
        assert!(matches!(session.setup(&fx.config), Err(SessionError::InvalidState { .. })));
        session.close().unwrap();
    }

    #[test]
    fn test_double_close_is_noop() {
        let fx = fixture();
        let factory = MemoryWriterFactory::new();
        let (mut session, var) = registered(&factory, &fx);
        session.write(var, slice(15.5)).unwrap();
        let first = session.close().unwrap();
        let second = session.close().unwrap();
        assert_eq!(first, second);
        assert_eq!(factory.store().len(), 1);
    }

    #[test]
    fn test_operations_after_close() {
        let fx = fixture();
        let (mut session, var) = registered(&MemoryWriterFactory::new(), &fx);
        session.close().unwrap();
        assert!(matches!(session.write(var, slice(1.0)), Err(SessionError::InvalidState { .. })));
        assert!(matches!(session.register_variable("ts", "K", &[]), Err(SessionError::InvalidState { .. })));
        assert!(matches!(session.close_variable(var), Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let fx = fixture();
        let (mut session, var) = registered(&MemoryWriterFactory::new(), &fx);
        session.write(var, slice(45.0)).unwrap();
        assert!(matches!(session.write(var, slice(45.0)), Err(SessionError::OutOfOrder { .. })));
        assert!(matches!(session.write(var, slice(15.5)), Err(SessionError::OutOfOrder { .. })));
        session.close().unwrap();
    }

    #[test]
    fn test_non_finite_stamp_rejected() {
        let fx = fixture();
        let factory = MemoryWriterFactory::new();
        let (mut session, var) = registered(&factory, &fx);
        session.write(var, slice(15.5)).unwrap();
        assert!(matches!(session.write(var, slice(f64::NAN)), Err(SessionError::TimeStamp { .. })));
        let open_bounds = TimeSlice::timed(TimeStamp::new(45.0, [31.0, f64::INFINITY]), vec![2, 2], vec![280.0; 4]);
        assert!(matches!(session.write(var, open_bounds), Err(SessionError::TimeStamp { .. })));
        // Ordering is still checked against the last accepted stamp
        assert!(matches!(session.write(var, slice(1.0)), Err(SessionError::OutOfOrder { .. })));
        session.close().unwrap();
        assert_eq!(factory.store().get("tas").unwrap().slices.len(), 1);
    }

    #[test]
    fn test_close_after_failed_write_keeps_prefix() {
        let fx = fixture();
        let factory = MemoryWriterFactory::failing_at(2);
        let (mut session, var) = registered(&factory, &fx);
        session.write(var, slice(15.5)).unwrap();
        session.write(var, slice(45.0)).unwrap();
        assert!(matches!(session.write(var, slice(74.5)), Err(SessionError::Write { .. })));

        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        let artifact = factory.store().get("tas").unwrap();
        assert_eq!(artifact.slices.len(), 2);
        assert!(artifact.path.to_string_lossy().ends_with("_185001-185002.nc"));
    }

    #[test]
    fn test_duplicate_variable() {
        let fx = fixture();
        let (mut session, _) = registered(&MemoryWriterFactory::new(), &fx);
        let handles = session.register_axes(axes());
        assert!(handles.is_err());
        let err = session.register_variable("tas", "K", &[]).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateVariable(_)));
        session.close().unwrap();
    }

    #[test]
    fn test_registration_checks() {
        let fx = fixture();
        let mut session = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
        session.setup(&fx.config).unwrap();
        session.load_table("Amon").unwrap();
        let handles = session.register_axes(axes()).unwrap();

        assert!(matches!(
            session.register_variable("tas", "degC", &handles),
            Err(SessionError::UnitsMismatch { .. })
        ));
        assert!(matches!(
            session.register_variable("nope", "K", &handles),
            Err(SessionError::UnknownTableEntry { .. })
        ));
        assert!(matches!(
            session.register_variable("tas", "K", &handles[1..]),
            Err(SessionError::AxisMismatch { .. })
        ));
        let reordered = [handles[1], handles[0], handles[2]];
        assert!(matches!(
            session.register_variable("tas", "K", &reordered),
            Err(SessionError::AxisMismatch { .. })
        ));
        let foreign = [AxisHandle::new(u64::MAX, 0), handles[1], handles[2]];
        assert!(matches!(
            session.register_variable("tas", "K", &foreign),
            Err(SessionError::UnknownHandle(_))
        ));
        session.close().unwrap();
    }

    #[test]
    fn test_unknown_axis_entry_rejected() {
        let fx = fixture();
        let mut session = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
        session.setup(&fx.config).unwrap();
        session.load_table("Amon").unwrap();
        let bogus = AxisDescriptor::new("plev19", "Pa", vec![100000.0], None).unwrap();
        assert!(matches!(
            session.register_axes(vec![bogus]),
            Err(SessionError::UnknownTableEntry { .. })
        ));
        session.close().unwrap();
    }

    #[test]
    fn test_shape_and_stamp_checks() {
        let fx = fixture();
        let (mut session, var) = registered(&MemoryWriterFactory::new(), &fx);
        let wrong = TimeSlice::timed(TimeStamp::new(1.0, [0.0, 2.0]), vec![2, 3], vec![0.0; 6]);
        assert!(matches!(session.write(var, wrong), Err(SessionError::ShapeMismatch { .. })));
        let unstamped = TimeSlice::fixed(vec![2, 2], vec![0.0; 4]);
        assert!(matches!(session.write(var, unstamped), Err(SessionError::TimeStamp { .. })));
        session.close().unwrap();
    }

    #[test]
    fn test_fixed_variable_single_slice() {
        let fx = fixture();
        let factory = MemoryWriterFactory::new();
        let mut session = CmorSession::new(Arc::new(factory.clone()));
        session.setup(&fx.config).unwrap();
        session.load_table("fx").unwrap();
        let axes = AxisBuilder::new()
            .latitude(vec![-45.0, 45.0], Some(vec![[-90.0, 0.0], [0.0, 90.0]]))
            .longitude(vec![90.0, 270.0], Some(vec![[0.0, 180.0], [180.0, 360.0]]))
            .build()
            .unwrap();
        let handles = session.register_axes(axes).unwrap();
        let var = session.register_variable("orog", "m", &handles).unwrap();
        session.write(var, TimeSlice::fixed(vec![2, 2], vec![10.0; 4])).unwrap();
        assert!(matches!(
            session.write(var, TimeSlice::fixed(vec![2, 2], vec![10.0; 4])),
            Err(SessionError::TimeStamp { .. })
        ));
        let paths = session.close().unwrap();
        assert!(paths[0].to_string_lossy().ends_with("orog_fx_E3SM-1-0_piControl_r1i1p1f1_gr.nc"));
    }

    #[test]
    fn test_variable_scope_closes_on_drop() {
        let fx = fixture();
        let factory = MemoryWriterFactory::new();
        let (mut session, var) = registered(&factory, &fx);
        {
            let mut scope = VariableScope::new(&mut session, var);
            scope.write(slice(15.5)).unwrap();
        }
        assert_eq!(factory.store().len(), 1);
        assert_eq!(session.close_variable(var).unwrap(), None);
        session.close().unwrap();
    }

    #[test]
    fn test_drop_releases_token() {
        let fx = fixture();
        {
            let mut session = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
            session.setup(&fx.config).unwrap();
        }
        let mut next = CmorSession::new(Arc::new(MemoryWriterFactory::new()));
        next.setup(&fx.config).unwrap();
        next.close().unwrap();
    }
}
