//! Schema tables and run metadata for tests.
//!
//! The tables written here follow the layout of the published CMIP6 CMOR
//! tables (`{"Header": ..., "variable_entry": ...}`) but only carry the
//! entries the test suite uses.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

/// One `variable_entry` row: `(name, units, dimensions, standard_name)`.
pub type EntrySpec<'a> = (&'a str, &'a str, &'a str, &'a str);

pub const AMON: &[EntrySpec] = &[
    ("tas", "K", "longitude latitude time height2m", "air_temperature"),
    ("tasmin", "K", "longitude latitude time height2m", "air_temperature"),
    ("ts", "K", "longitude latitude time", "surface_temperature"),
    ("pr", "kg m-2 s-1", "longitude latitude time", "precipitation_flux"),
    ("clt", "%", "longitude latitude time", "cloud_area_fraction"),
    ("rlus", "W m-2", "longitude latitude time", "surface_upwelling_longwave_flux_in_air"),
];

pub const LMON: &[EntrySpec] = &[
    ("mrro", "kg m-2 s-1", "longitude latitude time", "runoff_flux"),
    ("mrros", "kg m-2 s-1", "longitude latitude time", "surface_runoff_flux"),
    ("mrsol", "kg m-2", "longitude latitude sdepth time", "mass_content_of_water_in_soil_layer"),
];

pub const FX: &[EntrySpec] = &[
    ("areacella", "m2", "longitude latitude", "cell_area"),
    ("sftlf", "%", "longitude latitude typeland", "land_area_fraction"),
    ("orog", "m", "longitude latitude", "surface_altitude"),
];

pub const OMON: &[EntrySpec] = &[
    ("tos", "degC", "longitude latitude time", "sea_surface_temperature"),
    ("sos", "0.001", "longitude latitude time", "sea_surface_salinity"),
    ("thetao", "degC", "longitude latitude olevel time", "sea_water_potential_temperature"),
    ("so", "0.001", "longitude latitude olevel time", "sea_water_salinity"),
    ("wo", "m s-1", "longitude latitude olevhalf time", "upward_sea_water_velocity"),
    ("mlotst", "m", "longitude latitude time", "ocean_mixed_layer_thickness_defined_by_sigma_t"),
];

pub const SIMON: &[EntrySpec] = &[
    ("siconc", "%", "longitude latitude time typesi", "sea_ice_area_fraction"),
    ("sivol", "m", "longitude latitude time", "sea_ice_volume_per_unit_area"),
    ("sithick", "m", "longitude latitude time", "sea_ice_thickness"),
];

/// Builds a table document.
pub fn table_json(table: &str, realm: &str, frequency: &str, entries: &[EntrySpec]) -> Value {
    let mut variables = Map::new();
    for (name, units, dims, standard_name) in entries {
        variables.insert(
            name.to_string(),
            json!({
                "frequency": frequency,
                "modeling_realm": realm,
                "standard_name": standard_name,
                "units": units,
                "cell_methods": "area: time: mean",
                "cell_measures": "area: areacella",
                "long_name": standard_name.replace('_', " "),
                "comment": "",
                "dimensions": dims,
                "out_name": name,
                "type": "real",
                "positive": "",
                "valid_min": "",
                "valid_max": "",
                "ok_min_mean_abs": "",
                "ok_max_mean_abs": ""
            }),
        );
    }
    json!({
        "Header": {
            "data_specs_version": "01.00.33",
            "table_id": format!("Table {table}"),
            "realm": realm,
            "frequency": frequency,
            "cmor_version": "3.5",
            "table_date": "18 November 2020",
            "missing_value": "1e20",
            "int_missing_value": "-999",
            "product": "model-output",
            "Conventions": "CF-1.7 CMIP-6.2",
            "mip_era": "CMIP6"
        },
        "variable_entry": variables
    })
}

/// Coordinate table covering the axes used by the built-in handlers.
pub fn coordinate_json() -> Value {
    json!({
        "axis_entry": {
            "time": {
                "standard_name": "time", "units": "days since ?", "axis": "T",
                "long_name": "time", "out_name": "time", "stored_direction": "increasing",
                "must_have_bounds": "yes", "type": "double", "value": ""
            },
            "latitude": {
                "standard_name": "latitude", "units": "degrees_north", "axis": "Y",
                "long_name": "Latitude", "out_name": "lat", "stored_direction": "increasing",
                "must_have_bounds": "yes", "type": "double", "value": ""
            },
            "longitude": {
                "standard_name": "longitude", "units": "degrees_east", "axis": "X",
                "long_name": "Longitude", "out_name": "lon", "stored_direction": "increasing",
                "must_have_bounds": "yes", "type": "double", "value": ""
            },
            "depth_coord": {
                "standard_name": "depth", "units": "m", "axis": "Z", "positive": "down",
                "long_name": "ocean depth coordinate", "out_name": "lev",
                "stored_direction": "increasing", "must_have_bounds": "yes", "type": "double", "value": ""
            },
            "depth_coord_half": {
                "standard_name": "depth", "units": "m", "axis": "Z", "positive": "down",
                "long_name": "ocean depth coordinate", "out_name": "lev",
                "stored_direction": "increasing", "must_have_bounds": "no", "type": "double", "value": ""
            },
            "sdepth": {
                "standard_name": "depth", "units": "m", "axis": "Z", "positive": "down",
                "long_name": "depth", "out_name": "depth", "stored_direction": "increasing",
                "must_have_bounds": "yes", "type": "double", "value": ""
            },
            "height2m": {
                "standard_name": "height", "units": "m", "axis": "Z", "positive": "up",
                "long_name": "height", "out_name": "height", "stored_direction": "increasing",
                "must_have_bounds": "no", "type": "double", "value": "2."
            },
            "typeland": {
                "standard_name": "area_type", "units": "", "long_name": "Land area type",
                "out_name": "type", "type": "character", "value": "land", "must_have_bounds": "no"
            },
            "typesi": {
                "standard_name": "area_type", "units": "", "long_name": "Sea Ice area type",
                "out_name": "type", "type": "character", "value": "sea_ice", "must_have_bounds": "no"
            }
        }
    })
}

fn write_json(path: &Path, value: &Value) {
    let text = serde_json::to_string_pretty(value).expect("serialize fixture");
    std::fs::write(path, text).expect("write fixture");
}

/// Writes one table file `CMIP6_{table}.json` into `dir`.
pub fn write_table(dir: &Path, table: &str, realm: &str, frequency: &str, entries: &[EntrySpec]) -> PathBuf {
    let path = dir.join(format!("CMIP6_{table}.json"));
    write_json(&path, &table_json(table, realm, frequency, entries));
    path
}

/// Writes the Amon, Lmon, fx, Omon, SImon and coordinate tables into
/// `dir/Tables` and returns `dir` (the schema root).
pub fn write_schema_tables(dir: &Path) -> PathBuf {
    let tables = dir.join("Tables");
    std::fs::create_dir_all(&tables).expect("create Tables dir");
    write_table(&tables, "Amon", "atmos", "mon", AMON);
    write_table(&tables, "Lmon", "land", "mon", LMON);
    write_table(&tables, "fx", "atmos", "fx", FX);
    write_table(&tables, "Omon", "ocean", "mon", OMON);
    write_table(&tables, "SImon", "seaIce", "mon", SIMON);
    write_json(&tables.join("CMIP6_coordinate.json"), &coordinate_json());
    dir.to_path_buf()
}

/// Run metadata as found in the converter's `user_input.json`.
pub fn run_metadata_json(outpath: &Path) -> Value {
    json!({
        "#note": "comment keys are ignored",
        "_control_vocabulary_file": "CMIP6_CV.json",
        "activity_id": "CMIP",
        "outpath": outpath.display().to_string(),
        "experiment_id": "piControl",
        "institution_id": "E3SM-Project",
        "source_id": "E3SM-1-0",
        "mip_era": "CMIP6",
        "variant_label": "r1i1p1f1",
        "grid_label": "gr",
        "calendar": "noleap",
        "institution": "LLNL (Lawrence Livermore National Laboratory, Livermore, CA 94550, USA)",
        "license": "CMIP6 model data produced by E3SM-Project is licensed under a Creative Commons Attribution ShareAlike 4.0 International License",
        "contact": "e3sm-data-support@llnl.gov"
    })
}

/// Writes `user_input.json` into `dir` with outputs under `outpath`.
pub fn write_run_metadata(dir: &Path, outpath: &Path) -> PathBuf {
    let path = dir.join("user_input.json");
    write_json(&path, &run_metadata_json(outpath));
    path
}
