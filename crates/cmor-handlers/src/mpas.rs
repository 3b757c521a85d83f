//! Handler for MPAS ocean and sea-ice variables: mask the native mesh
//! field, remap it onto the mapping file's target grid, then write.

use std::path::Path;

use cmip_common::{AxisBuilder, AxisDescriptor, Calendar, CalendarDate, TimeSlice, TimeStamp, TimeUnits, FILL_VALUE};
use cmor_session::OutputSession;
use mesh_remap::{cell_mask, CellMask, MappingMatrix, Mesh, RemapEngine, RemapReport, TargetGrid};
use netcdf_parser::{ArrayVariable, Dataset, DatasetReader};
use tracing::{debug, info, warn};

use crate::derivation::Derivation;
use crate::error::{HandlerError, Result};
use crate::handler::{resolve_inputs, run_session, Handler, SliceSource};
use crate::request::{HandlerOutcome, HandlerRequest};
use crate::variables::{Source, VariableSpec, Vertical, MPAS_MAP, MPAS_MESH};

const TIME_DIM: &str = "Time";
const CELL_DIM: &str = "nCells";
const XTIME_START: &str = "xtime_startMonthly";
const XTIME_END: &str = "xtime_endMonthly";

/// Monthly MPAS statistics on the unstructured mesh (Omon, SImon).
#[derive(Debug, Clone)]
pub struct MpasHandler {
    spec: VariableSpec,
}

impl MpasHandler {
    pub fn new(spec: VariableSpec) -> Self {
        Self { spec }
    }

    fn prepare(&self, request: &HandlerRequest<'_>) -> Result<(Vec<AxisDescriptor>, MpasSource)> {
        let spec = &self.spec;
        let Source::Mpas {
            component,
            fields,
            vertical,
        } = spec.source
        else {
            return Err(HandlerError::invalid_input(spec.name, "not an MPAS variable"));
        };
        let inputs = resolve_inputs(spec, request)?;

        let mesh_file = inputs
            .first(MPAS_MESH)
            .ok_or_else(|| HandlerError::invalid_input(spec.name, "no mesh file"))?;
        let map_file = inputs
            .first(MPAS_MAP)
            .ok_or_else(|| HandlerError::invalid_input(spec.name, "no mapping file"))?;
        let mesh = read_mesh(request.reader, mesh_file)?;
        let matrix = read_matrix(spec.name, request.reader, map_file)?;
        if matrix.n_a() != mesh.n_cells {
            return Err(HandlerError::invalid_input(
                spec.name,
                format!("mapping file has {} source cells, mesh has {}", matrix.n_a(), mesh.n_cells),
            ));
        }
        let target = matrix
            .target()
            .cloned()
            .ok_or_else(|| HandlerError::invalid_input(spec.name, "mapping file has no target grid description"))?;

        let files = inputs.files(component.key());
        let mut names: Vec<&str> = fields.to_vec();
        names.extend([XTIME_START, XTIME_END]);
        debug!(variable = spec.name, files = files.len(), "Reading MPAS statistics");
        let mut ds = request.reader.read_series(files, &names)?;
        let (units, stamps) = monthly_stamps(spec.name, &ds)?;

        let mut layout = vec![TIME_DIM];
        layout.extend(vertical.level_dim());
        layout.push(CELL_DIM);
        let mut variables = Vec::with_capacity(fields.len());
        for &field in fields {
            let mut var = ds
                .variables
                .remove(field)
                .ok_or_else(|| HandlerError::invalid_input(spec.name, format!("{field} not read")))?
                .to_layout(&layout)?;
            var.normalize_fill();
            variables.push(var);
        }

        let in_levels = match vertical.level_dim() {
            Some(dim) => ds.dim(dim).or_else(|_| {
                variables
                    .first()
                    .and_then(|v| v.shape.get(1).copied())
                    .ok_or_else(|| HandlerError::invalid_input(spec.name, format!("no {dim} dimension")))
            })?,
            None => 1,
        };
        for var in &variables {
            if var.record_count() != stamps.len() || var.record_size() != in_levels * mesh.n_cells {
                return Err(HandlerError::invalid_input(
                    spec.name,
                    format!(
                        "{} has shape {:?}, expected {} steps of {} levels x {} cells",
                        var.name,
                        var.shape,
                        stamps.len(),
                        in_levels,
                        mesh.n_cells
                    ),
                ));
            }
        }

        // A surface extraction of a layered field is written as a surface field
        let out_vertical = match spec.derivation {
            Derivation::SurfaceLevel => Vertical::Surface,
            _ => vertical,
        };
        let out_levels = spec.derivation.output_levels(in_levels);
        let mask = cell_mask(&mesh, out_vertical.kind());
        if mask.levels() != out_levels {
            return Err(HandlerError::invalid_input(
                spec.name,
                format!("field has {out_levels} levels, mesh defines {}", mask.levels()),
            ));
        }

        let axes = mpas_axes(&units, out_vertical, &mesh, &target)?;

        info!(
            variable = spec.name,
            steps = stamps.len(),
            levels = out_levels,
            cells = mesh.n_cells,
            nlat = target.nlat(),
            nlon = target.nlon(),
            "Prepared MPAS variable"
        );

        let mut shape = vec![target.nlat(), target.nlon()];
        if out_vertical != Vertical::Surface {
            shape.insert(0, out_levels);
        }
        Ok((
            axes,
            MpasSource {
                name: spec.name,
                derivation: spec.derivation,
                variables,
                stamps,
                in_levels,
                out_levels,
                cells: mesh.n_cells,
                mask,
                matrix,
                engine: RemapEngine::new(request.options.remap.clone())?,
                shape,
                report: RemapReport::default(),
            },
        ))
    }
}

impl Handler for MpasHandler {
    fn spec(&self) -> &VariableSpec {
        &self.spec
    }

    fn handle(&self, request: &HandlerRequest<'_>, session: &mut dyn OutputSession) -> Result<HandlerOutcome> {
        info!(variable = self.spec.name, table = self.spec.table, "Starting");
        if request.options.simple {
            warn!(variable = self.spec.name, "Simple mode does not apply to MPAS variables");
        }
        let (axes, mut source) = self.prepare(request)?;
        let outcome = run_session(&self.spec, request, session, axes, &mut source)?;
        if let Some(report) = &outcome.coverage {
            info!(
                variable = self.spec.name,
                coverage = report.coverage(),
                masked_targets = report.masked_targets,
                uncovered_rows = report.uncovered_rows,
                "Remap coverage"
            );
        }
        Ok(outcome)
    }
}

/// Mesh geometry. Only `nCells` is required; the level variables are used
/// when the file has them.
fn read_mesh(reader: &dyn DatasetReader, path: &Path) -> Result<Mesh> {
    let ds = reader.read_available(path, &Mesh::VARIABLES)?;
    Ok(Mesh::from_dataset(&ds)?)
}

fn read_matrix(variable: &str, reader: &dyn DatasetReader, path: &Path) -> Result<MappingMatrix> {
    let mut ds = reader.read(path, &MappingMatrix::VARIABLES)?;
    let grid = reader.read_available(path, &MappingMatrix::GRID_VARIABLES)?;
    merge(&mut ds, grid)?;
    let matrix = MappingMatrix::from_dataset(&ds)?;
    debug!(variable, path = %path.display(), nnz = matrix.nnz(), "Read mapping file");
    Ok(matrix)
}

fn merge(into: &mut Dataset, other: Dataset) -> Result<()> {
    for (name, len) in other.dims {
        into.dims.entry(name).or_insert(len);
    }
    for (_, var) in other.variables {
        if !into.has_variable(&var.name) {
            into.insert(var)?;
        }
    }
    Ok(())
}

/// Time stamps from the monthly start/end strings, encoded in the MPAS
/// default units. Values are bound midpoints.
fn monthly_stamps(variable: &str, ds: &Dataset) -> Result<(String, Vec<TimeStamp>)> {
    let units = TimeUnits::mpas_default();
    let starts = ds.variable(XTIME_START)?.strings()?;
    let ends = ds.variable(XTIME_END)?.strings()?;
    if starts.len() != ends.len() {
        return Err(HandlerError::invalid_input(
            variable,
            format!("{} start times but {} end times", starts.len(), ends.len()),
        ));
    }

    let encode = |text: &str| -> Result<f64> {
        let date = CalendarDate::parse(text, Calendar::NoLeap)?;
        Ok(units.encode(&date)?)
    };
    let mut stamps = Vec::with_capacity(starts.len());
    for (start, end) in starts.iter().zip(ends) {
        let bounds = [encode(start)?, encode(end)?];
        if bounds[1] <= bounds[0] {
            return Err(HandlerError::invalid_input(
                variable,
                format!("time interval {start} .. {end} is empty"),
            ));
        }
        stamps.push(TimeStamp::midpoint(bounds));
    }
    Ok((units.to_string(), stamps))
}

fn mpas_axes(units: &str, vertical: Vertical, mesh: &Mesh, target: &TargetGrid) -> Result<Vec<AxisDescriptor>> {
    let mut builder = AxisBuilder::new().time(units);
    match vertical {
        Vertical::Surface => {}
        Vertical::Centered => {
            let (mids, bounds) = mesh.depth_coord();
            builder = builder.axis("depth_coord", "m", mids, Some(bounds));
        }
        Vertical::Interface => {
            builder = builder.axis("depth_coord_half", "m", mesh.depth_coord_half(), None);
        }
    }
    Ok(builder
        .latitude(target.lat.clone(), Some(target.lat_bnds.clone()))
        .longitude(target.lon.clone(), Some(target.lon_bnds.clone()))
        .build()?)
}

struct MpasSource {
    name: &'static str,
    derivation: Derivation,
    variables: Vec<ArrayVariable>,
    stamps: Vec<TimeStamp>,
    in_levels: usize,
    out_levels: usize,
    cells: usize,
    mask: CellMask,
    matrix: MappingMatrix,
    engine: RemapEngine,
    shape: Vec<usize>,
    report: RemapReport,
}

impl SliceSource for MpasSource {
    fn len(&self) -> usize {
        self.stamps.len()
    }

    fn slice(&mut self, index: usize) -> Result<TimeSlice> {
        let mut inputs = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            inputs.push((var.name.as_str(), var.record(index)?));
        }
        let mut field = self.derivation.apply(self.name, &inputs, self.in_levels)?;

        let masked = mesh_remap::apply(&mut field, self.out_levels, self.cells, &self.mask, FILL_VALUE)?;
        let remapped = self.engine.remap_levels(&field, self.out_levels, &self.matrix)?;
        self.report.merge(&remapped.report);
        debug!(
            variable = self.name,
            step = index,
            masked,
            masked_targets = remapped.report.masked_targets,
            "Remapped time step"
        );

        Ok(TimeSlice::timed(self.stamps[index], self.shape.clone(), remapped.data))
    }

    fn coverage(&self) -> Option<RemapReport> {
        Some(self.report)
    }
}

#[cfg(test)]
mod tests {
    use netcdf_parser::MemoryReader;
    use test_utils::{mpas_mesh_dataset, mpas_timeseries_dataset};

    use super::*;

    #[test]
    fn test_monthly_stamps_midpoints() {
        let ds = mpas_timeseries_dataset("t", 1, None, 0, 2, |_, _, _| 0.0);
        let (units, stamps) = monthly_stamps("tos", &ds).unwrap();
        assert!(units.starts_with("days since 0001-01-01"));
        assert_eq!(stamps[0].bounds, [0.0, 31.0]);
        assert_eq!(stamps[0].value, 15.5);
        assert_eq!(stamps[1].bounds, [31.0, 59.0]);
    }

    #[test]
    fn test_read_mesh_without_optional_variables() {
        let mesh = mpas_mesh_dataset(&[2, 0], &[10.0, 30.0]);
        let reader = MemoryReader::new().with("/mesh.nc", mesh);
        let mesh = read_mesh(&reader, Path::new("/mesh.nc")).unwrap();
        assert_eq!(mesh.n_cells, 2);
        assert_eq!(mesh.n_levels, 2);
        assert!(mesh.min_level_cell.is_none());
    }

    #[test]
    fn test_read_matrix_without_target() {
        let mut map = test_utils::identity_mapping_dataset(1, 2);
        for name in MappingMatrix::GRID_VARIABLES {
            map.variables.remove(name);
        }
        let reader = MemoryReader::new().with("/map.nc", map);
        let matrix = read_matrix("tos", &reader, Path::new("/map.nc")).unwrap();
        assert_eq!(matrix.n_a(), 2);
        assert!(matrix.target().is_none());
    }

    #[test]
    fn test_axes_by_vertical() {
        let mesh = Mesh::new(1).with_levels(vec![10.0, 30.0]);
        let target = TargetGrid::uniform(2, 3);
        let units = TimeUnits::mpas_default().to_string();

        let axes = mpas_axes(&units, Vertical::Centered, &mesh, &target).unwrap();
        let entries: Vec<_> = axes.iter().map(|a| a.table_entry()).collect();
        assert_eq!(entries, vec!["time", "depth_coord", "latitude", "longitude"]);
        assert_eq!(axes[1].coord_vals(), &[5.0, 20.0]);
        assert_eq!(axes[1].cell_bounds().unwrap(), &[[0.0, 10.0], [10.0, 30.0]]);

        let axes = mpas_axes(&units, Vertical::Interface, &mesh, &target).unwrap();
        assert_eq!(axes[1].coord_vals(), &[0.0, 10.0, 30.0]);

        let axes = mpas_axes(&units, Vertical::Surface, &mesh, &target).unwrap();
        assert_eq!(axes.len(), 3);
    }
}
