//! Batch runner and the no-session-call guarantee for missing inputs.

mod common;

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use cmip_common::{AxisDescriptor, TimeSlice};
use cmor_handlers::{HandlerRegistry, Runner};
use cmor_session::{AxisHandle, OutputSession, SessionConfig, SessionState, VariableHandle};
use common::Workspace;
use test_utils::gridded_dataset;

/// Session that only counts calls.
struct CountingSession {
    calls: Rc<Cell<usize>>,
}

impl CountingSession {
    fn bump(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl OutputSession for CountingSession {
    fn setup(&mut self, _config: &SessionConfig) -> cmor_session::Result<()> {
        self.bump();
        Ok(())
    }

    fn load_table(&mut self, _name: &str) -> cmor_session::Result<()> {
        self.bump();
        Ok(())
    }

    fn register_axes(&mut self, axes: Vec<AxisDescriptor>) -> cmor_session::Result<Vec<AxisHandle>> {
        self.bump();
        Ok((0..axes.len()).map(|i| AxisHandle::new(0, i)).collect())
    }

    fn register_variable(&mut self, _name: &str, _units: &str, _axes: &[AxisHandle]) -> cmor_session::Result<VariableHandle> {
        self.bump();
        Ok(VariableHandle::new(0, 0))
    }

    fn write(&mut self, _variable: VariableHandle, _slice: TimeSlice) -> cmor_session::Result<()> {
        self.bump();
        Ok(())
    }

    fn close_variable(&mut self, _variable: VariableHandle) -> cmor_session::Result<Option<PathBuf>> {
        self.bump();
        Ok(None)
    }

    fn close(&mut self) -> cmor_session::Result<Vec<PathBuf>> {
        self.bump();
        Ok(Vec::new())
    }

    fn state(&self) -> SessionState {
        SessionState::Uninitialized
    }
}

#[test]
fn test_missing_input_makes_no_session_call() {
    let ws = Workspace::new();
    let calls = Rc::new(Cell::new(0));
    let registry = HandlerRegistry::builtin();

    for name in ["tas", "areacella", "tos", "siconc"] {
        let mut session = CountingSession { calls: calls.clone() };
        let err = registry
            .dispatch(name)
            .unwrap()
            .handle(&ws.request(), &mut session)
            .unwrap_err();
        assert!(err.is_missing_input(), "{name}: {err}");
    }
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_counting_session_sees_full_sequence() {
    let mut ws = Workspace::new();
    ws.add("TS", "TS_185001_185002.nc", gridded_dataset("TS", "K", 1, 1, 2, |_, _, _| 290.0));
    let calls = Rc::new(Cell::new(0));

    let mut session = CountingSession { calls: calls.clone() };
    HandlerRegistry::builtin()
        .dispatch("ts")
        .unwrap()
        .handle(&ws.request(), &mut session)
        .unwrap();
    // setup, load_table, register_axes, register_variable, 2 writes,
    // close_variable, close
    assert_eq!(calls.get(), 8);
}

#[test]
fn test_best_effort_failures_are_tolerated() {
    let mut ws = Workspace::new();
    ws.add("TREFHT", "TREFHT_185001_185001.nc", gridded_dataset("TREFHT", "K", 1, 1, 1, |_, _, _| 280.0));

    let registry = HandlerRegistry::builtin();
    let handlers = registry.resolve_selection(&["tas", "mrro"]).unwrap();
    let runner = Runner::new(|| Box::new(ws.session()) as Box<dyn OutputSession>);
    let summary = runner.run(&handlers, &ws.request());

    assert!(summary.is_success());
    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.succeeded[0].variable, "tas");
    assert_eq!(summary.tolerated.len(), 1);
    assert_eq!(summary.tolerated[0].variable, "mrro");
    assert!(summary.tolerated[0].error.contains("QRUNOFF"));
}

#[test]
fn test_required_failure_fails_the_batch() {
    let mut ws = Workspace::new();
    ws.add("TREFHT", "TREFHT_185001_185001.nc", gridded_dataset("TREFHT", "K", 1, 1, 1, |_, _, _| 280.0));

    let registry = HandlerRegistry::builtin();
    let handlers = registry.resolve_selection(&["pr", "tas"]).unwrap();
    let runner = Runner::new(|| Box::new(ws.session()) as Box<dyn OutputSession>);
    let summary = runner.run(&handlers, &ws.request());

    assert!(!summary.is_success());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].variable, "pr");
    assert_eq!(summary.succeeded.len(), 1);
    assert!(ws.store().get("tas").is_some());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["failed"][0]["variable"], "pr");
}
