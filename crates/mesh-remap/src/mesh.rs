//! MPAS mesh description.

use netcdf_parser::Dataset;
use tracing::debug;

use crate::error::{RemapError, Result};

/// The parts of an MPAS mesh the pipeline needs.
///
/// Level indices in `max_level_cell`/`min_level_cell` are 1-based as in the
/// MPAS restart files; `max_level_cell[c] == 0` marks a land cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub n_cells: usize,
    pub n_levels: usize,
    pub ref_bottom_depth: Vec<f64>,
    pub max_level_cell: Option<Vec<u32>>,
    pub min_level_cell: Option<Vec<u32>>,
    pub area_cell: Option<Vec<f64>>,
}

impl Mesh {
    /// Mesh without level information (e.g. sea ice).
    pub fn new(n_cells: usize) -> Self {
        Self {
            n_cells,
            n_levels: 0,
            ref_bottom_depth: Vec::new(),
            max_level_cell: None,
            min_level_cell: None,
            area_cell: None,
        }
    }

    pub fn with_levels(mut self, ref_bottom_depth: Vec<f64>) -> Self {
        self.n_levels = ref_bottom_depth.len();
        self.ref_bottom_depth = ref_bottom_depth;
        self
    }

    pub fn with_max_level_cell(mut self, max_level_cell: Vec<u32>) -> Result<Self> {
        check_len("maxLevelCell", self.n_cells, max_level_cell.len())?;
        self.max_level_cell = Some(max_level_cell);
        Ok(self)
    }

    pub fn with_min_level_cell(mut self, min_level_cell: Vec<u32>) -> Result<Self> {
        check_len("minLevelCell", self.n_cells, min_level_cell.len())?;
        self.min_level_cell = Some(min_level_cell);
        Ok(self)
    }

    pub fn with_area_cell(mut self, area_cell: Vec<f64>) -> Result<Self> {
        check_len("areaCell", self.n_cells, area_cell.len())?;
        self.area_cell = Some(area_cell);
        Ok(self)
    }

    /// Variables to request from a mesh file.
    pub const VARIABLES: [&'static str; 4] =
        ["refBottomDepth", "maxLevelCell", "minLevelCell", "areaCell"];

    /// Build from a dataset read from an MPAS mesh or restart file.
    ///
    /// `nCells` is mandatory; `refBottomDepth`, `maxLevelCell`,
    /// `minLevelCell` and `areaCell` are used when present.
    pub fn from_dataset(ds: &Dataset) -> Result<Self> {
        let n_cells = ds
            .dim("nCells")
            .map_err(|_| RemapError::invalid_mesh("missing dimension nCells"))?;

        let mut mesh = Self::new(n_cells);

        if let Ok(depth) = ds.variable("refBottomDepth") {
            mesh = mesh.with_levels(depth.values()?.to_vec());
        } else if let Ok(n) = ds.dim("nVertLevels") {
            mesh.n_levels = n;
        }

        if let Ok(var) = ds.variable("maxLevelCell") {
            mesh = mesh.with_max_level_cell(to_levels("maxLevelCell", var.values()?)?)?;
        }
        if let Ok(var) = ds.variable("minLevelCell") {
            mesh = mesh.with_min_level_cell(to_levels("minLevelCell", var.values()?)?)?;
        }
        if let Ok(var) = ds.variable("areaCell") {
            mesh = mesh.with_area_cell(var.values()?.to_vec())?;
        }

        debug!(
            n_cells = mesh.n_cells,
            n_levels = mesh.n_levels,
            has_max_level = mesh.max_level_cell.is_some(),
            "Loaded MPAS mesh"
        );
        Ok(mesh)
    }

    /// Layer-centre depths with `[top, bottom]` bounds, from `refBottomDepth`.
    pub fn depth_coord(&self) -> (Vec<f64>, Vec<[f64; 2]>) {
        let mut top = 0.0;
        let mut mids = Vec::with_capacity(self.n_levels);
        let mut bounds = Vec::with_capacity(self.n_levels);
        for &bottom in &self.ref_bottom_depth {
            mids.push(0.5 * (top + bottom));
            bounds.push([top, bottom]);
            top = bottom;
        }
        (mids, bounds)
    }

    /// Layer-interface depths: `[0, refBottomDepth...]`.
    pub fn depth_coord_half(&self) -> Vec<f64> {
        std::iter::once(0.0)
            .chain(self.ref_bottom_depth.iter().copied())
            .collect()
    }
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RemapError::shape_mismatch(what, expected, actual));
    }
    Ok(())
}

fn to_levels(what: &str, values: &[f64]) -> Result<Vec<u32>> {
    values
        .iter()
        .map(|&v| {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
                Ok(v as u32)
            } else {
                Err(RemapError::invalid_mesh(format!("{what}: invalid level index {v}")))
            }
        })
        .collect()
}
