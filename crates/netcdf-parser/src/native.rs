//! Native NetCDF reading using the netcdf library.
//!
//! Values are read as `f64` whatever their storage type, with
//! `scale_factor`/`add_offset` applied and declared fill values mapped to the
//! pipeline fill sentinel. Character arrays (MPAS `xtime_*`) are decoded into
//! one string per record.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;

use tracing::{debug, warn};

use crate::dataset::{ArrayVariable, AttrValue, Dataset, VarData};
use crate::error::{NetCdfError, NetCdfResult};
use crate::reader::DatasetReader;

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist).
///
/// It only needs to be called once per process, but is safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Reader backed by libnetcdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfReader;

impl NetcdfReader {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetReader for NetcdfReader {
    fn read(&self, path: &Path, names: &[&str]) -> NetCdfResult<Dataset> {
        silence_hdf5_errors();

        let file = netcdf::open(path).map_err(|e| NetCdfError::open(path, e))?;

        let mut dataset = Dataset::new();
        for dim in file.dimensions() {
            dataset.dims.insert(dim.name().to_string(), dim.len());
        }
        for attr in file.attributes() {
            if let Some(value) = attr.value().ok().and_then(convert_attr) {
                dataset.attributes.insert(attr.name().to_string(), value);
            }
        }

        if names.is_empty() {
            for var in file.variables() {
                match read_variable(&var) {
                    Ok(v) => dataset.insert(v)?,
                    Err(e) => debug!(variable = %var.name(), error = %e, "Skipping unreadable variable"),
                }
            }
        } else {
            for name in names {
                let var = file
                    .variable(name)
                    .ok_or_else(|| NetCdfError::missing_variable(path, name))?;
                dataset.insert(read_variable(&var)?)?;
            }
        }

        debug!(
            path = %path.display(),
            variables = dataset.variables.len(),
            "Read dataset"
        );
        Ok(dataset)
    }
}

fn read_variable(var: &netcdf::Variable) -> NetCdfResult<ArrayVariable> {
    let name = var.name().to_string();
    let mut dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let mut shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

    let mut attributes = BTreeMap::new();
    for attr in var.attributes() {
        if let Some(value) = attr.value().ok().and_then(convert_attr) {
            attributes.insert(attr.name().to_string(), value);
        }
    }

    let data = match var.get_values::<f64, _>(..) {
        Ok(values) => {
            let scale = get_f64_attr(var, "scale_factor").unwrap_or(1.0);
            let offset = get_f64_attr(var, "add_offset").unwrap_or(0.0);
            let fill = get_f64_attr(var, "_FillValue").or_else(|| get_f64_attr(var, "missing_value"));
            let values = values
                .into_iter()
                .map(|v| match fill {
                    Some(f) if v == f => f64::NAN,
                    _ => v * scale + offset,
                })
                .collect();
            VarData::Numeric(values)
        }
        Err(numeric_err) => {
            // Character arrays: the trailing dimension is the string length
            let width = match shape.last() {
                Some(&w) if w > 0 => w,
                _ => return Err(NetCdfError::read(&name, numeric_err)),
            };
            let raw = var
                .get_raw_values(..)
                .map_err(|_| NetCdfError::read(&name, numeric_err))?;
            let strings = raw
                .chunks(width)
                .map(|chunk| {
                    String::from_utf8_lossy(chunk)
                        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
                        .to_string()
                })
                .collect();
            dims.pop();
            shape.pop();
            VarData::Text(strings)
        }
    };

    let mut variable = match data {
        VarData::Numeric(values) => ArrayVariable::numeric(&name, &dims, &shape, values)?,
        VarData::Text(values) => ArrayVariable::text(&name, &dims, &shape, values)?,
    };
    variable.attributes = attributes;
    variable.normalize_fill();
    Ok(variable)
}

fn convert_attr(value: netcdf::AttributeValue) -> Option<AttrValue> {
    match value {
        netcdf::AttributeValue::Str(s) => Some(AttrValue::Text(s)),
        netcdf::AttributeValue::Strs(s) => Some(AttrValue::Text(s.join("\n"))),
        netcdf::AttributeValue::Doubles(v) => Some(AttrValue::Numbers(v)),
        netcdf::AttributeValue::Floats(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        netcdf::AttributeValue::Ints(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        netcdf::AttributeValue::Shorts(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        scalar => match f64::try_from(scalar) {
            Ok(v) => Some(AttrValue::Number(v)),
            Err(_) => {
                warn!("Ignoring attribute of unsupported type");
                None
            }
        },
    }
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}
