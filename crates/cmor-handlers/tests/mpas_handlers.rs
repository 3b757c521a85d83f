//! MPAS handlers: mask, remap and write ocean and sea-ice fields.

mod common;

use cmip_common::FILL_VALUE;
use cmor_handlers::variables::{MPAS_MAP, MPAS_MESH};
use cmor_handlers::{HandlerError, HandlerRegistry};
use cmor_session::{OutputSession, SessionState};
use common::{file_name, Workspace};
use netcdf_parser::Dataset;
use test_utils::{identity_mapping_dataset, mapping_dataset, mpas_mesh_dataset, mpas_timeseries_dataset};

const TEMPERATURE: &str = "timeMonthly_avg_activeTracers_temperature";

/// Four cells on a 2x2 target grid: cell 2 is land, cell 3 is one level deep.
fn ocean_workspace(months: usize, map: Dataset) -> Workspace {
    let mut ws = Workspace::new();
    ws.add(MPAS_MESH, "case.mpaso.rst.0002-01-01_00000.nc", mpas_mesh_dataset(&[2, 2, 0, 1], &[10.0, 30.0]));
    ws.add(MPAS_MAP, "map_mesh_to_grid.nc", map);
    ws.add(
        "MPASO",
        "case.mpaso.hist.am.timeSeriesStatsMonthly.0001-01-01.nc",
        mpas_timeseries_dataset(TEMPERATURE, 4, Some(("nVertLevels", 2)), 0, months, |month, cell, level| {
            10.0 * month as f64 + cell as f64 + 100.0 * level as f64
        }),
    );
    ws
}

#[test]
fn test_tos_masks_land_and_remaps() {
    let ws = ocean_workspace(2, identity_mapping_dataset(2, 2));
    let handler = HandlerRegistry::builtin().dispatch("tos").unwrap();
    let mut session = ws.session();
    let outcome = handler.handle(&ws.request(), &mut session).unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(outcome.slices_written, 2);
    let coverage = outcome.coverage.unwrap();
    assert_eq!(coverage.targets, 8);
    assert_eq!(coverage.masked_targets, 2);
    assert_eq!(coverage.uncovered_rows, 0);

    let artifact = ws.store().get("tos").unwrap();
    assert_eq!(artifact.slices[0].shape, vec![2, 2]);
    assert_eq!(artifact.slices[0].data, vec![0.0, 1.0, FILL_VALUE, 3.0]);
    assert_eq!(artifact.slices[1].data, vec![10.0, 11.0, FILL_VALUE, 13.0]);

    let stamp = artifact.slices[0].time.unwrap();
    assert_eq!(stamp.bounds, [0.0, 31.0]);
    assert_eq!(stamp.value, 15.5);
    assert!(file_name(&artifact.path).ends_with("_000101-000102.nc"));
    assert_eq!(artifact.spec.axes.len(), 3);
}

#[test]
fn test_thetao_per_level_mask_and_depth_axis() {
    let ws = ocean_workspace(1, identity_mapping_dataset(2, 2));

    let handler = HandlerRegistry::builtin().dispatch("thetao").unwrap();
    handler.handle(&ws.request(), &mut ws.session()).unwrap();

    let artifact = ws.store().get("thetao").unwrap();
    let lev = &artifact.spec.axes[1];
    assert_eq!(lev.name, "lev");
    assert_eq!(lev.descriptor.coord_vals(), &[5.0, 20.0]);
    assert_eq!(lev.descriptor.cell_bounds().unwrap(), &[[0.0, 10.0], [10.0, 30.0]]);

    let slice = &artifact.slices[0];
    assert_eq!(slice.shape, vec![2, 2, 2]);
    assert_eq!(
        slice.data,
        vec![0.0, 1.0, FILL_VALUE, 3.0, 100.0, 101.0, FILL_VALUE, FILL_VALUE]
    );
}

#[test]
fn test_multi_file_series_is_concatenated() {
    let mut ws = Workspace::new();
    ws.add(MPAS_MESH, "case.mpassi.rst.nc", mpas_mesh_dataset(&[1, 1], &[10.0]));
    ws.add(MPAS_MAP, "map.nc", mapping_dataset(2, 1, 1, &[(0, 0, 0.25), (0, 1, 0.75)]));
    for (index, first_month) in [0, 2].into_iter().enumerate() {
        ws.add(
            "MPASSI",
            &format!("case.mpassi.hist.am.timeSeriesStatsMonthly.{index}.nc"),
            mpas_timeseries_dataset("timeMonthly_avg_iceAreaCell", 2, None, first_month, 2, |month, cell, _| {
                0.1 * (month + cell) as f64
            }),
        );
    }

    let handler = HandlerRegistry::builtin().dispatch("siconc").unwrap();
    let outcome = handler.handle(&ws.request(), &mut ws.session()).unwrap();
    assert_eq!(outcome.slices_written, 4);

    let artifact = ws.store().get("siconc").unwrap();
    let values: Vec<f64> = artifact.slices.iter().map(|s| s.data[0]).collect();
    // 100 * (0.25 * a0 + 0.75 * a1) with a_cell = 0.1 * (month + cell)
    test_utils::assert_all_approx_eq!(values, [7.5, 17.5, 27.5, 37.5], 1e-9);
    let last = artifact.slices[3].time.unwrap();
    assert_eq!(last.bounds, [90.0, 120.0]);
}

#[test]
fn test_mapping_without_target_grid_is_rejected() {
    let mut map = identity_mapping_dataset(2, 2);
    for name in ["yc_b", "xc_b", "yv_b", "xv_b", "dst_grid_dims"] {
        map.variables.remove(name);
    }
    let ws = ocean_workspace(1, map);

    let handler = HandlerRegistry::builtin().dispatch("tos").unwrap();
    let mut session = ws.session();
    let err = handler.handle(&ws.request(), &mut session).unwrap_err();
    assert!(matches!(err, HandlerError::InvalidInput { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[test]
fn test_mesh_and_mapping_size_mismatch() {
    let ws = ocean_workspace(1, identity_mapping_dataset(3, 3));
    let handler = HandlerRegistry::builtin().dispatch("tos").unwrap();
    let err = handler.handle(&ws.request(), &mut ws.session()).unwrap_err();
    assert!(err.to_string().contains("source cells"), "{err}");
}

#[test]
fn test_missing_mesh_short_circuits() {
    let mut ws = Workspace::new();
    ws.add(MPAS_MAP, "map.nc", identity_mapping_dataset(2, 2));

    let handler = HandlerRegistry::builtin().dispatch("sivol").unwrap();
    let err = handler.handle(&ws.request(), &mut ws.session()).unwrap_err();
    match err {
        HandlerError::MissingInput { variable, key } => {
            assert_eq!(variable, "sivol");
            assert_eq!(key, "MPASSI, MPAS_mesh");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(ws.store().is_empty());
}
