//! Coordinate reading for regular-grid inputs.

use std::path::{Path, PathBuf};

use cmip_common::bounds_from_flat;
use netcdf_parser::{ArrayVariable, DatasetReader};
use tracing::debug;

use crate::error::{HandlerError, Result};

/// Names tried, in order, for the time bounds of atmosphere/land files.
pub const TIME_BOUNDS_NAMES: [&str; 2] = ["time_bnds", "time_bounds"];

/// Latitude/longitude centres and bounds of a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularGrid {
    pub lat: Vec<f64>,
    pub lat_bnds: Vec<[f64; 2]>,
    pub lon: Vec<f64>,
    pub lon_bnds: Vec<[f64; 2]>,
}

impl RegularGrid {
    pub const VARIABLES: [&'static str; 4] = ["lat", "lon", "lat_bnds", "lon_bnds"];

    /// Read the grid from one raw file. All four variables are required.
    pub fn read(reader: &dyn DatasetReader, path: &Path) -> Result<Self> {
        let ds = reader.read(path, &Self::VARIABLES)?;
        let values = |name: &str| -> Result<Vec<f64>> { Ok(ds.variable(name)?.values()?.to_vec()) };

        let grid = Self {
            lat: values("lat")?,
            lat_bnds: bounds_from_flat("latitude", &values("lat_bnds")?)?,
            lon: values("lon")?,
            lon_bnds: bounds_from_flat("longitude", &values("lon_bnds")?)?,
        };
        debug!(
            path = %path.display(),
            nlat = grid.nlat(),
            nlon = grid.nlon(),
            "Read regular grid"
        );
        Ok(grid)
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }
}

/// Time values, bounds and units of a file series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    pub units: String,
    pub values: Vec<f64>,
    pub bounds: Vec<[f64; 2]>,
}

impl TimeAxis {
    /// `time` is taken from the already-read field dataset; the bounds are
    /// read from the series under the first name that exists.
    pub fn read(variable: &str, reader: &dyn DatasetReader, files: &[PathBuf], time: &ArrayVariable) -> Result<Self> {
        let units = time
            .units()
            .ok_or_else(|| HandlerError::invalid_input(variable, "time has no units attribute"))?
            .to_string();
        let values = time.values()?.to_vec();

        let mut last_error = None;
        for name in TIME_BOUNDS_NAMES {
            match reader.read_series(files, &[name]) {
                Ok(ds) => {
                    let bounds = bounds_from_flat("time", ds.variable(name)?.values()?)?;
                    if bounds.len() != values.len() {
                        return Err(HandlerError::invalid_input(
                            variable,
                            format!("{} time values but {} bounds", values.len(), bounds.len()),
                        ));
                    }
                    return Ok(Self { units, values, bounds });
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(HandlerError::invalid_input(
            variable,
            format!(
                "no time bounds ({}): {}",
                TIME_BOUNDS_NAMES.join(" or "),
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        ))
    }
}

/// Cell bounds halfway between neighbouring centres, for level
/// coordinates stored without bounds. Outer edges are extrapolated; a
/// first edge is never negative when the first centre is not.
pub fn midpoint_bounds(centres: &[f64]) -> Vec<[f64; 2]> {
    match centres {
        [] => Vec::new(),
        [only] if *only >= 0.0 => vec![[0.0, 2.0 * only]],
        [only] => vec![[2.0 * only, 0.0]],
        _ => {
            let n = centres.len();
            let mut edges = Vec::with_capacity(n + 1);
            let first = centres[0] - 0.5 * (centres[1] - centres[0]);
            edges.push(if centres[0] >= 0.0 { first.max(0.0) } else { first });
            for pair in centres.windows(2) {
                edges.push(0.5 * (pair[0] + pair[1]));
            }
            edges.push(centres[n - 1] + 0.5 * (centres[n - 1] - centres[n - 2]));
            edges.windows(2).map(|e| [e[0], e[1]]).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use netcdf_parser::MemoryReader;

    use super::*;

    #[test]
    fn test_read_grid() {
        let reader = MemoryReader::new().with("/ts.nc", test_utils::gridded_dataset("TS", "K", 2, 4, 1, |_, _, _| 0.0));
        let grid = RegularGrid::read(&reader, Path::new("/ts.nc")).unwrap();
        assert_eq!(grid.lat, vec![-45.0, 45.0]);
        assert_eq!(grid.lat_bnds, vec![[-90.0, 0.0], [0.0, 90.0]]);
        assert_eq!(grid.nlon(), 4);
        assert_eq!(grid.lon_bnds[3], [270.0, 360.0]);
    }

    #[test]
    fn test_time_axis_falls_back_to_time_bounds() {
        let mut ds = test_utils::gridded_dataset("QRUNOFF", "mm/s", 1, 1, 2, |_, _, _| 0.0);
        let mut bounds = ds.variables.remove("time_bnds").unwrap();
        bounds.name = "time_bounds".to_string();
        ds.variables.insert("time_bounds".to_string(), bounds);
        let reader = MemoryReader::new().with("/q.nc", ds.clone());

        let files = vec![PathBuf::from("/q.nc")];
        let time = ds.variable("time").unwrap();
        let axis = TimeAxis::read("mrro", &reader, &files, time).unwrap();
        assert_eq!(axis.values, vec![15.5, 45.0]);
        assert_eq!(axis.bounds, vec![[0.0, 31.0], [31.0, 59.0]]);
        assert_eq!(axis.units, test_utils::TIME_UNITS);
    }

    #[test]
    fn test_missing_time_bounds() {
        let mut ds = test_utils::gridded_dataset("TS", "K", 1, 1, 1, |_, _, _| 0.0);
        ds.variables.remove("time_bnds");
        let reader = MemoryReader::new().with("/ts.nc", ds.clone());
        let err = TimeAxis::read("ts", &reader, &[PathBuf::from("/ts.nc")], ds.variable("time").unwrap()).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInput { .. }));
    }

    #[test]
    fn test_midpoint_bounds() {
        assert_eq!(
            midpoint_bounds(&[0.5, 1.5, 3.5]),
            vec![[0.0, 1.0], [1.0, 2.5], [2.5, 4.5]]
        );
        assert_eq!(midpoint_bounds(&[0.25, 1.75]), vec![[0.0, 1.0], [1.0, 2.5]]);
        assert_eq!(midpoint_bounds(&[1.0, 2.0]), vec![[0.5, 1.5], [1.5, 2.5]]);
        assert_eq!(midpoint_bounds(&[-10.0, 10.0]), vec![[-20.0, 0.0], [0.0, 20.0]]);
        assert_eq!(midpoint_bounds(&[2.0]), vec![[0.0, 4.0]]);
    }
}
