//! Handlers for regular-grid variables: monthly time series and fixed
//! fields. These never mask or remap.

use cmip_common::{AxisBuilder, AxisDescriptor, TimeSlice, TimeStamp};
use cmor_session::OutputSession;
use netcdf_parser::{ArrayVariable, DatasetReader};
use tracing::{debug, info};

use crate::derivation::Derivation;
use crate::error::{HandlerError, Result};
use crate::grid::{midpoint_bounds, RegularGrid, TimeAxis};
use crate::handler::{resolve_inputs, run_session, write_simple, Handler, SliceSource};
use crate::request::{HandlerOutcome, HandlerRequest};
use crate::variables::{Source, VariableSpec};

const TIME_DIM: &str = "time";
const HORIZONTAL_DIMS: [&str; 2] = ["lat", "lon"];

/// Time-varying variable on the model's regular grid (Amon, Lmon).
#[derive(Debug, Clone)]
pub struct GriddedHandler {
    spec: VariableSpec,
}

impl GriddedHandler {
    pub fn new(spec: VariableSpec) -> Self {
        Self { spec }
    }

    fn prepare(&self, request: &HandlerRequest<'_>) -> Result<(Vec<AxisDescriptor>, GriddedSource)> {
        let spec = &self.spec;
        let Source::Gridded { fields, level_axis } = spec.source else {
            return Err(HandlerError::invalid_input(spec.name, "not a regular-grid variable"));
        };
        let inputs = resolve_inputs(spec, request)?;

        let mut variables = Vec::with_capacity(fields.len());
        let mut time = None;
        for &field in fields {
            let files = inputs.files(field);
            debug!(variable = spec.name, field, files = files.len(), "Reading raw field");
            let mut ds = request.reader.read_series(files, &[field, TIME_DIM])?;
            if time.is_none() {
                let time_var = ds.variable(TIME_DIM)?;
                time = Some(TimeAxis::read(spec.name, request.reader, files, time_var)?);
            }
            let mut var = ds
                .variables
                .remove(field)
                .ok_or_else(|| HandlerError::invalid_input(spec.name, format!("{field} not read")))?;
            var.normalize_fill();
            variables.push(var);
        }
        let time = time.ok_or_else(|| HandlerError::invalid_input(spec.name, "no raw fields declared"))?;

        let first_file = fields
            .first()
            .and_then(|f| inputs.first(f))
            .ok_or_else(|| HandlerError::invalid_input(spec.name, "no raw fields declared"))?;
        let grid = RegularGrid::read(request.reader, first_file)?;

        let level_dim = level_dimension(spec.name, &variables[0], level_axis)?;
        let mut builder = AxisBuilder::new()
            .time(time.units.clone())
            .latitude(grid.lat.clone(), Some(grid.lat_bnds.clone()))
            .longitude(grid.lon.clone(), Some(grid.lon_bnds.clone()));

        let mut shape = vec![grid.nlat(), grid.nlon()];
        let mut levels = 1;
        if let (Some(dim), Some(entry)) = (&level_dim, level_axis) {
            let (values, bounds, units) = read_level_axis(request.reader, first_file, dim)?;
            levels = values.len();
            shape.insert(0, levels);
            builder = builder.axis(entry, units, values, Some(bounds));
        }
        let axes = builder.build()?;

        let mut layout = vec![TIME_DIM];
        if let Some(dim) = &level_dim {
            layout.push(dim.as_str());
        }
        layout.extend(HORIZONTAL_DIMS);
        let variables = variables
            .iter()
            .map(|v| v.to_layout(&layout))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let per_step: usize = shape.iter().product();
        for var in &variables {
            if var.record_count() != time.values.len() || var.record_size() != per_step {
                return Err(HandlerError::invalid_input(
                    spec.name,
                    format!(
                        "{} has shape {:?}, expected {} steps of {:?}",
                        var.name,
                        var.shape,
                        time.values.len(),
                        shape
                    ),
                ));
            }
        }

        info!(
            variable = spec.name,
            steps = time.values.len(),
            levels,
            nlat = grid.nlat(),
            nlon = grid.nlon(),
            "Prepared regular-grid variable"
        );
        Ok((
            axes,
            GriddedSource {
                name: spec.name,
                derivation: spec.derivation,
                variables,
                time,
                shape,
                levels,
            },
        ))
    }
}

impl Handler for GriddedHandler {
    fn spec(&self) -> &VariableSpec {
        &self.spec
    }

    fn handle(&self, request: &HandlerRequest<'_>, session: &mut dyn OutputSession) -> Result<HandlerOutcome> {
        info!(variable = self.spec.name, table = self.spec.table, "Starting");
        let (axes, mut source) = self.prepare(request)?;
        if request.options.simple {
            return write_simple(&self.spec, request, axes, &mut source);
        }
        run_session(&self.spec, request, session, axes, &mut source)
    }
}

/// The non-horizontal, non-time dimension of a raw field, if any.
fn level_dimension(variable: &str, field: &ArrayVariable, level_axis: Option<&str>) -> Result<Option<String>> {
    let extra: Vec<&String> = field
        .dims
        .iter()
        .filter(|d| d.as_str() != TIME_DIM && !HORIZONTAL_DIMS.contains(&d.as_str()))
        .collect();
    match (extra.as_slice(), level_axis) {
        ([], None) => Ok(None),
        ([dim], Some(_)) => Ok(Some(dim.to_string())),
        ([], Some(entry)) => Err(HandlerError::invalid_input(
            variable,
            format!("{} has no level dimension for {entry}", field.name),
        )),
        (dims, _) => Err(HandlerError::invalid_input(
            variable,
            format!("{} has unsupported dimensions {:?}", field.name, dims),
        )),
    }
}

fn read_level_axis(
    reader: &dyn DatasetReader,
    path: &std::path::Path,
    dim: &str,
) -> Result<(Vec<f64>, Vec<[f64; 2]>, String)> {
    let ds = reader.read(path, &[dim])?;
    let coord = ds.variable(dim)?;
    let values = coord.values()?.to_vec();
    let units = coord.units().unwrap_or_default().to_string();

    let bounds_name = format!("{dim}_bnds");
    let bounds = match reader.read(path, &[bounds_name.as_str()]) {
        Ok(bds) => cmip_common::bounds_from_flat(dim, bds.variable(&bounds_name)?.values()?)?,
        Err(_) => {
            debug!(dim, "Level coordinate has no bounds, using midpoints");
            midpoint_bounds(&values)
        }
    };
    Ok((values, bounds, units))
}

struct GriddedSource {
    name: &'static str,
    derivation: Derivation,
    variables: Vec<ArrayVariable>,
    time: TimeAxis,
    shape: Vec<usize>,
    levels: usize,
}

impl SliceSource for GriddedSource {
    fn len(&self) -> usize {
        self.time.values.len()
    }

    fn slice(&mut self, index: usize) -> Result<TimeSlice> {
        let mut inputs = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            inputs.push((var.name.as_str(), var.record(index)?));
        }
        let data = self.derivation.apply(self.name, &inputs, self.levels)?;
        let stamp = TimeStamp::new(self.time.values[index], self.time.bounds[index]);
        Ok(TimeSlice::timed(stamp, self.shape.clone(), data))
    }
}

/// Time-invariant variable on the model's regular grid (fx).
#[derive(Debug, Clone)]
pub struct FixedHandler {
    spec: VariableSpec,
}

impl FixedHandler {
    pub fn new(spec: VariableSpec) -> Self {
        Self { spec }
    }

    fn prepare(&self, request: &HandlerRequest<'_>) -> Result<(Vec<AxisDescriptor>, FixedSource)> {
        let spec = &self.spec;
        let Source::Fixed { fields } = spec.source else {
            return Err(HandlerError::invalid_input(spec.name, "not a fixed variable"));
        };
        let inputs = resolve_inputs(spec, request)?;

        let first_file = fields
            .first()
            .and_then(|f| inputs.first(f))
            .ok_or_else(|| HandlerError::invalid_input(spec.name, "no raw fields declared"))?;
        let grid = RegularGrid::read(request.reader, first_file)?;
        let size = grid.nlat() * grid.nlon();

        let mut variables = Vec::with_capacity(fields.len());
        for &field in fields {
            let path = inputs
                .first(field)
                .ok_or_else(|| HandlerError::invalid_input(spec.name, format!("{field} has no file")))?;
            let ds = request.reader.read(path, &[field])?;
            let mut var = ds.variable(field)?.clone();
            var.normalize_fill();
            // Fixed fields sometimes carry a single time record
            let values = if var.has_record_dim() {
                var.record(0)?.to_vec()
            } else {
                var.values()?.to_vec()
            };
            if values.len() != size {
                return Err(HandlerError::invalid_input(
                    spec.name,
                    format!("{field} has {} values for a {}x{} grid", values.len(), grid.nlat(), grid.nlon()),
                ));
            }
            variables.push((field, values));
        }

        let columns: Vec<(&str, &[f64])> = variables.iter().map(|(n, v)| (*n, v.as_slice())).collect();
        let data = spec.derivation.apply(spec.name, &columns, 1)?;

        let axes = AxisBuilder::new()
            .latitude(grid.lat.clone(), Some(grid.lat_bnds.clone()))
            .longitude(grid.lon.clone(), Some(grid.lon_bnds.clone()))
            .build()?;

        Ok((
            axes,
            FixedSource {
                slice: Some(TimeSlice::fixed(vec![grid.nlat(), grid.nlon()], data)),
            },
        ))
    }
}

impl Handler for FixedHandler {
    fn spec(&self) -> &VariableSpec {
        &self.spec
    }

    fn handle(&self, request: &HandlerRequest<'_>, session: &mut dyn OutputSession) -> Result<HandlerOutcome> {
        info!(variable = self.spec.name, table = self.spec.table, "Starting");
        let (axes, mut source) = self.prepare(request)?;
        if request.options.simple {
            return write_simple(&self.spec, request, axes, &mut source);
        }
        run_session(&self.spec, request, session, axes, &mut source)
    }
}

struct FixedSource {
    slice: Option<TimeSlice>,
}

impl SliceSource for FixedSource {
    fn len(&self) -> usize {
        1
    }

    fn slice(&mut self, _index: usize) -> Result<TimeSlice> {
        self.slice
            .take()
            .ok_or_else(|| HandlerError::invalid_input("fixed", "slice already written"))
    }
}
