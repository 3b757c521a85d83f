//! Regular-grid handlers driven end to end through a real session and an
//! in-memory writer.

mod common;

use cmip_common::FILL_VALUE;
use cmor_handlers::{HandlerError, HandlerRegistry};
use cmor_session::{MemoryWriterFactory, OutputSession, SessionState};
use common::{file_name, Workspace};
use test_utils::{assert_all_approx_eq, gridded_dataset, monthly_time_bounds};

#[test]
fn test_tas_constant_field() {
    let mut ws = Workspace::new();
    ws.add("TREFHT", "TREFHT_185001_185003.nc", gridded_dataset("TREFHT", "K", 2, 2, 3, |_, _, _| 280.0));

    let handler = HandlerRegistry::builtin().dispatch("tas").unwrap();
    let mut session = ws.session();
    let outcome = handler.handle(&ws.request(), &mut session).unwrap();

    assert_eq!(outcome.variable, "tas");
    assert_eq!(outcome.slices_written, 3);
    assert!(outcome.coverage.is_none());
    assert_eq!(session.state(), SessionState::Closed);

    let artifact = ws.store().get("tas").unwrap();
    assert_eq!(artifact.slices.len(), 3);
    let bounds: Vec<[f64; 2]> = artifact.slices.iter().map(|s| s.time.unwrap().bounds).collect();
    assert_eq!(bounds, monthly_time_bounds(0, 3));
    for slice in &artifact.slices {
        assert_eq!(slice.shape, vec![2, 2]);
        assert_eq!(slice.data, vec![280.0; 4]);
    }
    assert!(file_name(&artifact.path).ends_with("_185001-185003.nc"));
    assert_eq!(outcome.artifacts, vec![artifact.path.clone()]);

    // height2m comes from the schema as a singleton coordinate
    assert_eq!(artifact.spec.scalars.len(), 1);
    assert_eq!(artifact.spec.scalars[0].value, 2.0);
}

#[test]
fn test_pr_sums_and_scales_with_fill() {
    let mut ws = Workspace::new();
    ws.add(
        "PRECC",
        "PRECC_185001_185002.nc",
        gridded_dataset("PRECC", "m/s", 1, 2, 2, |t, _, ilon| {
            if t == 1 && ilon == 1 {
                FILL_VALUE
            } else {
                1.0e-8
            }
        }),
    );
    ws.add("PRECL", "PRECL_185001_185002.nc", gridded_dataset("PRECL", "m/s", 1, 2, 2, |_, _, _| 2.0e-8));

    let handler = HandlerRegistry::builtin().dispatch("pr").unwrap();
    handler.handle(&ws.request(), &mut ws.session()).unwrap();

    let artifact = ws.store().get("pr").unwrap();
    assert_all_approx_eq!(artifact.slices[0].data, [3.0e-5, 3.0e-5], 1e-15);
    assert_eq!(artifact.slices[1].data[1], FILL_VALUE);
}

#[test]
fn test_missing_input_reports_every_key() {
    let mut ws = Workspace::new();
    ws.add("FSDS", "FSDS_185001_185001.nc", gridded_dataset("FSDS", "W/m2", 1, 1, 1, |_, _, _| 1.0));
    // Registered but absent on disk
    ws.raw.insert("FSNS", ws.dir.path().join("FSNS_missing.nc"));

    let handler = HandlerRegistry::builtin().dispatch("rsus").unwrap();
    let mut session = ws.session();
    let err = handler.handle(&ws.request(), &mut session).unwrap_err();

    match err {
        HandlerError::MissingInput { variable, key } => {
            assert_eq!(variable, "rsus");
            assert_eq!(key, "FSNS");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(ws.store().is_empty());
}

#[test]
fn test_failed_write_still_closes_session() {
    let mut ws = Workspace::with_writers(MemoryWriterFactory::failing_at(1));
    ws.add("TS", "TS_185001_185003.nc", gridded_dataset("TS", "K", 1, 1, 3, |_, _, _| 290.0));

    let handler = HandlerRegistry::builtin().dispatch("ts").unwrap();
    let mut session = ws.session();
    let err = handler.handle(&ws.request(), &mut session).unwrap_err();

    assert!(matches!(err, HandlerError::Session(_)));
    assert_eq!(session.state(), SessionState::Closed);
    // What was written before the failure is finalized
    let partial = ws.store().get("ts").unwrap();
    assert_eq!(partial.slices.len(), 1);
    assert!(file_name(&partial.path).ends_with("_185001-185001.nc"));
}

#[test]
fn test_units_mismatch_with_table() {
    let mut ws = Workspace::new();
    ws.add("CLDTOT", "CLDTOT_185001_185001.nc", gridded_dataset("CLDTOT", "1", 1, 1, 1, |_, _, _| 0.5));

    let mut spec = cmor_handlers::BUILTIN.iter().find(|s| s.name == "clt").copied().unwrap();
    spec.units = "1";
    let handler = cmor_handlers::GriddedHandler::new(spec);
    let err = cmor_handlers::Handler::handle(&handler, &ws.request(), &mut ws.session()).unwrap_err();
    assert!(err.to_string().contains("units"), "{err}");
}

#[test]
fn test_mrsol_sums_soil_layers() {
    let levels = [0.5, 1.5, 3.5];
    let mut ws = Workspace::new();
    ws.add(
        "SOILLIQ",
        "SOILLIQ_185001_185002.nc",
        test_utils::gridded_level_dataset("SOILLIQ", "kg/m2", "levgrnd", &levels, 1, 2, 2, |t, k, _, _| {
            10.0 * (k + 1) as f64 + t as f64
        }),
    );
    ws.add(
        "SOILICE",
        "SOILICE_185001_185002.nc",
        test_utils::gridded_level_dataset("SOILICE", "kg/m2", "levgrnd", &levels, 1, 2, 2, |_, _, _, _| 1.0),
    );

    let handler = HandlerRegistry::builtin().dispatch("mrsol").unwrap();
    let outcome = handler.handle(&ws.request(), &mut ws.session()).unwrap();
    assert_eq!(outcome.slices_written, 2);

    let artifact = ws.store().get("mrsol").unwrap();
    let depth = artifact
        .spec
        .axes
        .iter()
        .find(|a| a.descriptor.table_entry() == "sdepth")
        .unwrap();
    assert_eq!(depth.name, "depth");
    assert_eq!(depth.descriptor.coord_vals(), &levels);
    assert_eq!(
        depth.descriptor.cell_bounds().unwrap(),
        &[[0.0, 1.0], [1.0, 2.5], [2.5, 4.5]]
    );

    let first = &artifact.slices[0];
    assert_eq!(first.shape, vec![3, 1, 2]);
    assert_eq!(first.data, vec![11.0, 11.0, 21.0, 21.0, 31.0, 31.0]);
    assert_eq!(artifact.slices[1].data[0], 12.0);
}

#[test]
fn test_areacella_fixed_field() {
    let mut ws = Workspace::new();
    ws.add("area", "area_fx.nc", test_utils::fixed_dataset("area", "radians^2", 2, 1, |ilat, _| (ilat + 1) as f64));

    let handler = HandlerRegistry::builtin().dispatch("areacella").unwrap();
    let outcome = handler.handle(&ws.request(), &mut ws.session()).unwrap();
    assert_eq!(outcome.slices_written, 1);

    let artifact = ws.store().get("areacella").unwrap();
    assert!(!artifact.spec.has_time());
    let slice = &artifact.slices[0];
    assert!(slice.time.is_none());
    let r2 = cmor_handlers::variables::EARTH_RADIUS.powi(2);
    assert_all_approx_eq!(slice.data, [r2, 2.0 * r2], 1.0);
    assert_eq!(file_name(&artifact.path), "areacella_fx_E3SM-1-0_piControl_r1i1p1f1_gr.nc");
}

#[test]
fn test_simple_mode_writes_without_session() {
    let mut ws = Workspace::new();
    ws.options.simple = true;
    ws.add("TREFHT", "TREFHT_185001_185003.nc", gridded_dataset("TREFHT", "K", 2, 2, 3, |_, _, _| 280.0));

    let handler = HandlerRegistry::builtin().dispatch("tas").unwrap();
    let mut session = ws.session();
    let outcome = handler.handle(&ws.request(), &mut session).unwrap();

    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(outcome.slices_written, 3);
    let artifact = ws.store().get("tas").unwrap();
    assert_eq!(artifact.slices.len(), 3);
    assert!(file_name(&artifact.path).ends_with("_185001-185003.nc"));
    assert_eq!(
        artifact.spec.variable_attributes.get("standard_name").map(String::as_str),
        Some("air_temperature")
    );
}

#[test]
fn test_simple_mode_keeps_write_error_when_finish_fails() {
    let mut ws = Workspace::with_writers(MemoryWriterFactory::failing_at(1).with_failing_finish());
    ws.options.simple = true;
    ws.add("TS", "TS_185001_185003.nc", gridded_dataset("TS", "K", 1, 1, 3, |_, _, _| 290.0));

    let handler = HandlerRegistry::builtin().dispatch("ts").unwrap();
    let err = handler.handle(&ws.request(), &mut ws.session()).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("slice 1"), "{message}");
    assert!(!message.contains("finish"), "{message}");
    assert!(ws.store().is_empty());
}
