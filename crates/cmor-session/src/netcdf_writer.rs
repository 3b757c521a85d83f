//! netCDF artifact writer.
//!
//! Writes to a hidden staging file next to the final artifact and renames
//! it into place on finish, so a crash never leaves a truncated file under
//! the published name.

use std::ops::Range;
use std::path::{Path, PathBuf};

use cmip_common::{is_fill, TimeSlice, FILL_VALUE_F32};
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::writer::{ArtifactSpec, ArtifactWriter, WriterFactory};

const BOUNDS_DIM: &str = "bnds";
const TIME_BOUNDS: &str = "time_bnds";

/// Factory for [`NetcdfArtifactWriter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfWriterFactory;

impl WriterFactory for NetcdfWriterFactory {
    fn writer(&self) -> Box<dyn ArtifactWriter> {
        Box::new(NetcdfArtifactWriter::default())
    }
}

#[derive(Default)]
pub struct NetcdfArtifactWriter {
    state: Option<Open>,
}

struct Open {
    file: netcdf::FileMut,
    spec: ArtifactSpec,
    staging: PathBuf,
    slices: usize,
}

fn nc_error(path: &Path) -> impl Fn(netcdf::Error) -> SessionError + '_ {
    move |e| SessionError::write(path.display().to_string(), e)
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values
        .iter()
        .map(|&v| if is_fill(v) { FILL_VALUE_F32 } else { v as f32 })
        .collect()
}

fn flat_bounds(bounds: &[[f64; 2]]) -> Vec<f64> {
    bounds.iter().flat_map(|b| b.iter().copied()).collect()
}

impl NetcdfArtifactWriter {
    fn open(&mut self) -> Result<&mut Open> {
        self.state
            .as_mut()
            .ok_or_else(|| SessionError::write("<netcdf>", "writer used before begin"))
    }

    fn create(spec: &ArtifactSpec, staging: &Path) -> Result<netcdf::FileMut> {
        let err = nc_error(staging);
        let mut file = netcdf::create(staging).map_err(&err)?;

        let has_bounds = spec.has_time() || spec.spatial_axes().any(|a| a.descriptor.cell_bounds().is_some());
        if spec.has_time() {
            file.add_unlimited_dimension("time").map_err(&err)?;
        }
        for axis in spec.spatial_axes() {
            file.add_dimension(&axis.name, axis.descriptor.coord_vals().len()).map_err(&err)?;
        }
        if has_bounds {
            file.add_dimension(BOUNDS_DIM, 2).map_err(&err)?;
        }

        for axis in &spec.axes {
            let bounds_name = format!("{}_bnds", axis.name);
            let has_axis_bounds = axis.descriptor.is_time() || axis.descriptor.cell_bounds().is_some();
            {
                let mut var = file.add_variable::<f64>(&axis.name, &[axis.name.as_str()]).map_err(&err)?;
                for (key, value) in &axis.attributes {
                    var.put_attribute(key, value.as_str()).map_err(&err)?;
                }
                var.put_attribute("units", axis.descriptor.units()).map_err(&err)?;
                if has_axis_bounds {
                    var.put_attribute("bounds", bounds_name.as_str()).map_err(&err)?;
                }
                if !axis.descriptor.is_time() {
                    var.put_values(axis.descriptor.coord_vals(), ..).map_err(&err)?;
                }
            }
            if has_axis_bounds {
                let mut var = file
                    .add_variable::<f64>(&bounds_name, &[axis.name.as_str(), BOUNDS_DIM])
                    .map_err(&err)?;
                if let Some(bounds) = axis.descriptor.cell_bounds() {
                    var.put_values(&flat_bounds(bounds), ..).map_err(&err)?;
                }
            }
        }

        for scalar in &spec.scalars {
            let mut var = file.add_variable::<f64>(&scalar.name, &[] as &[&str]).map_err(&err)?;
            for (key, value) in &scalar.attributes {
                var.put_attribute(key, value.as_str()).map_err(&err)?;
            }
            var.put_values(&[scalar.value], ..).map_err(&err)?;
        }

        {
            let dims: Vec<&str> = spec.axes.iter().map(|a| a.name.as_str()).collect();
            let mut var = file.add_variable::<f32>(&spec.variable, &dims).map_err(&err)?;
            var.put_attribute("_FillValue", spec.fill_value as f32).map_err(&err)?;
            var.put_attribute("missing_value", spec.fill_value as f32).map_err(&err)?;
            for (key, value) in &spec.variable_attributes {
                var.put_attribute(key, value.as_str()).map_err(&err)?;
            }
            if !spec.scalars.is_empty() {
                let coordinates: Vec<&str> = spec.scalars.iter().map(|s| s.name.as_str()).collect();
                var.put_attribute("coordinates", coordinates.join(" ").as_str()).map_err(&err)?;
            }
        }

        for (key, value) in &spec.global_attributes {
            file.add_attribute(key, value.as_str()).map_err(&err)?;
        }

        Ok(file)
    }
}

impl ArtifactWriter for NetcdfArtifactWriter {
    fn begin(&mut self, spec: &ArtifactSpec) -> Result<()> {
        std::fs::create_dir_all(&spec.directory)
            .map_err(|e| SessionError::write(spec.directory.display().to_string(), e))?;
        let staging = spec.staging_path();
        if staging.exists() {
            std::fs::remove_file(&staging)?;
        }
        let file = Self::create(spec, &staging)?;
        debug!(variable = %spec.variable, path = %staging.display(), "Created staging artifact");

        self.state = Some(Open {
            file,
            spec: spec.clone(),
            staging,
            slices: 0,
        });
        Ok(())
    }

    fn write_slice(&mut self, index: usize, slice: &TimeSlice) -> Result<()> {
        let open = self.open()?;
        let err = nc_error(&open.staging);
        let staging = open.staging.display().to_string();
        if !slice.is_consistent() {
            return Err(SessionError::write(
                staging,
                format!("slice {index} holds {} values for shape {:?}", slice.data.len(), slice.shape),
            ));
        }
        if slice.time.is_some() && (open.file.variable("time").is_none() || open.file.variable(TIME_BOUNDS).is_none()) {
            return Err(SessionError::write(staging, "missing time or time_bnds variable"));
        }
        let values = to_f32(&slice.data);

        let mut extents: Vec<Range<usize>> = Vec::with_capacity(slice.shape.len() + 1);
        if slice.time.is_some() {
            extents.push(index..index + 1);
        }
        extents.extend(slice.shape.iter().map(|&n| 0..n));

        // The data goes in before the time coordinate: a rejected put must
        // not grow the record dimension.
        let name = open.spec.variable.clone();
        let mut var = open
            .file
            .variable_mut(&name)
            .ok_or_else(|| SessionError::write(staging.clone(), format!("missing variable {name}")))?;
        var.put_values(&values, extents.as_slice()).map_err(&err)?;

        if let Some(stamp) = &slice.time {
            let mut time = open
                .file
                .variable_mut("time")
                .ok_or_else(|| SessionError::write(staging.clone(), "missing time variable"))?;
            time.put_values(&[stamp.value], [index..index + 1].as_slice()).map_err(&err)?;

            let mut bounds = open
                .file
                .variable_mut(TIME_BOUNDS)
                .ok_or_else(|| SessionError::write(staging.clone(), "missing time_bnds variable"))?;
            bounds
                .put_values(&stamp.bounds, [index..index + 1, 0..2].as_slice())
                .map_err(&err)?;
        }

        open.slices += 1;
        Ok(())
    }

    fn finish(&mut self, time_range: Option<&str>) -> Result<PathBuf> {
        let open = self
            .state
            .take()
            .ok_or_else(|| SessionError::write("<netcdf>", "writer finished before begin"))?;
        let Open {
            file,
            spec,
            staging,
            slices,
        } = open;
        drop(file);

        let path = spec.final_path(time_range);
        std::fs::rename(&staging, &path).map_err(|e| SessionError::write(path.display().to_string(), e))?;
        info!(variable = %spec.variable, slices, path = %path.display(), "Artifact finalized");
        Ok(path)
    }
}
