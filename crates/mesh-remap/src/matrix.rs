//! Sparse mapping matrix in CSR form.
//!
//! Mapping files follow the SCRIP/ESMF layout: `S` (weights), `row`
//! (target index) and `col` (source index), both 1-based, with `n_a`
//! sources and `n_b` targets. The destination grid is described by
//! `yc_b`/`xc_b` (centres), `yv_b`/`xv_b` (corners) and `dst_grid_dims`.

use netcdf_parser::Dataset;
use tracing::{debug, warn};

use crate::error::{RemapError, Result};

/// Regular latitude/longitude target grid.
///
/// Target index `j` maps to `(ilat, ilon)` with `j = ilat * nlon + ilon`.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat_bnds: Vec<[f64; 2]>,
    pub lon_bnds: Vec<[f64; 2]>,
}

impl TargetGrid {
    /// Grid from centres and bounds; lengths must agree.
    pub fn new(
        lat: Vec<f64>,
        lat_bnds: Vec<[f64; 2]>,
        lon: Vec<f64>,
        lon_bnds: Vec<[f64; 2]>,
    ) -> Result<Self> {
        if lat.len() != lat_bnds.len() {
            return Err(RemapError::shape_mismatch("lat_bnds", lat.len(), lat_bnds.len()));
        }
        if lon.len() != lon_bnds.len() {
            return Err(RemapError::shape_mismatch("lon_bnds", lon.len(), lon_bnds.len()));
        }
        Ok(Self {
            lat,
            lon,
            lat_bnds,
            lon_bnds,
        })
    }

    /// Evenly spaced global grid with cell-centred coordinates.
    pub fn uniform(nlat: usize, nlon: usize) -> Self {
        let dlat = 180.0 / nlat as f64;
        let dlon = 360.0 / nlon as f64;
        let lat_bnds: Vec<[f64; 2]> = (0..nlat)
            .map(|i| [-90.0 + i as f64 * dlat, -90.0 + (i + 1) as f64 * dlat])
            .collect();
        let lon_bnds: Vec<[f64; 2]> = (0..nlon)
            .map(|i| [i as f64 * dlon, (i + 1) as f64 * dlon])
            .collect();
        Self {
            lat: lat_bnds.iter().map(|b| 0.5 * (b[0] + b[1])).collect(),
            lon: lon_bnds.iter().map(|b| 0.5 * (b[0] + b[1])).collect(),
            lat_bnds,
            lon_bnds,
        }
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    pub fn size(&self) -> usize {
        self.nlat() * self.nlon()
    }

    /// Recover the 1-D axes from flattened SCRIP destination fields.
    fn from_scrip(
        nlon: usize,
        nlat: usize,
        yc: &[f64],
        xc: &[f64],
        yv: Option<&[f64]>,
        xv: Option<&[f64]>,
    ) -> Result<Self> {
        let n_b = nlon * nlat;
        if yc.len() != n_b || xc.len() != n_b {
            return Err(RemapError::shape_mismatch("yc_b/xc_b", n_b, yc.len().min(xc.len())));
        }

        let lat: Vec<f64> = (0..nlat).map(|i| yc[i * nlon]).collect();
        let lon: Vec<f64> = xc[..nlon].to_vec();

        let corner_bounds = |corners: &[f64], cell: usize, nv: usize| -> [f64; 2] {
            let c = &corners[cell * nv..(cell + 1) * nv];
            let lo = c.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = c.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            [lo, hi]
        };

        let lat_bnds = match yv {
            Some(yv) if n_b > 0 && yv.len() % n_b == 0 && yv.len() >= n_b => {
                let nv = yv.len() / n_b;
                (0..nlat).map(|i| corner_bounds(yv, i * nlon, nv)).collect()
            }
            _ => midpoint_bounds(&lat),
        };
        let lon_bnds = match xv {
            Some(xv) if n_b > 0 && xv.len() % n_b == 0 && xv.len() >= n_b => {
                let nv = xv.len() / n_b;
                (0..nlon)
                    .map(|i| {
                        // Corners taken within half a turn of the centre, so a
                        // cell across the 0/360 seam keeps its true extent.
                        let unwrapped: Vec<f64> = xv[i * nv..(i + 1) * nv]
                            .iter()
                            .map(|&x| x + 360.0 * ((lon[i] - x) / 360.0).round())
                            .collect();
                        corner_bounds(&unwrapped, 0, nv)
                    })
                    .collect()
            }
            _ => midpoint_bounds(&lon),
        };

        Self::new(lat, lat_bnds, lon, lon_bnds)
    }
}

/// Bounds halfway between neighbouring centres.
fn midpoint_bounds(centres: &[f64]) -> Vec<[f64; 2]> {
    let n = centres.len();
    (0..n)
        .map(|i| {
            let lo = if i == 0 {
                centres[0] - 0.5 * centres.get(1).map_or(0.0, |c1| c1 - centres[0])
            } else {
                0.5 * (centres[i - 1] + centres[i])
            };
            let hi = if i + 1 == n {
                centres[i] + 0.5 * if i > 0 { centres[i] - centres[i - 1] } else { 0.0 }
            } else {
                0.5 * (centres[i] + centres[i + 1])
            };
            [lo, hi]
        })
        .collect()
}

/// Immutable sparse operator, one CSR row per target cell.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingMatrix {
    n_a: usize,
    n_b: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    weights: Vec<f64>,
    target: Option<TargetGrid>,
}

impl MappingMatrix {
    /// Variables to request from a mapping file.
    pub const VARIABLES: [&'static str; 3] = ["S", "row", "col"];
    /// Optional destination-grid variables.
    pub const GRID_VARIABLES: [&'static str; 5] = ["yc_b", "xc_b", "yv_b", "xv_b", "dst_grid_dims"];

    /// Build from 0-based `(target, source, weight)` triplets.
    pub fn from_triplets(n_a: usize, n_b: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        let mut counts = vec![0usize; n_b + 1];
        for &(row, col, weight) in triplets {
            if row >= n_b {
                return Err(RemapError::invalid_matrix(format!("target index {row} >= n_b {n_b}")));
            }
            if col >= n_a {
                return Err(RemapError::invalid_matrix(format!("source index {col} >= n_a {n_a}")));
            }
            if !weight.is_finite() {
                return Err(RemapError::invalid_matrix(format!(
                    "non-finite weight at ({row}, {col})"
                )));
            }
            counts[row + 1] += 1;
        }

        let mut row_ptr = counts;
        for j in 0..n_b {
            row_ptr[j + 1] += row_ptr[j];
        }

        let nnz = triplets.len();
        let mut next = row_ptr.clone();
        let mut col_idx = vec![0usize; nnz];
        let mut weights = vec![0.0f64; nnz];
        for &(row, col, weight) in triplets {
            let slot = next[row];
            col_idx[slot] = col;
            weights[slot] = weight;
            next[row] += 1;
        }

        Ok(Self {
            n_a,
            n_b,
            row_ptr,
            col_idx,
            weights,
            target: None,
        })
    }

    /// One-to-one mapping with unit weights.
    pub fn identity(n: usize) -> Self {
        Self {
            n_a: n,
            n_b: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            weights: vec![1.0; n],
            target: None,
        }
    }

    pub fn with_target(mut self, target: TargetGrid) -> Result<Self> {
        if target.size() != self.n_b {
            return Err(RemapError::shape_mismatch("target grid", self.n_b, target.size()));
        }
        self.target = Some(target);
        Ok(self)
    }

    /// Build from a SCRIP/ESMF mapping dataset.
    pub fn from_dataset(ds: &Dataset) -> Result<Self> {
        let n_a = ds
            .dim("n_a")
            .map_err(|_| RemapError::invalid_matrix("missing dimension n_a"))?;
        let n_b = ds
            .dim("n_b")
            .map_err(|_| RemapError::invalid_matrix("missing dimension n_b"))?;

        let s = ds.variable("S")?.values()?;
        let row = ds.variable("row")?.values()?;
        let col = ds.variable("col")?.values()?;
        if s.len() != row.len() || s.len() != col.len() {
            return Err(RemapError::invalid_matrix(format!(
                "S/row/col lengths differ: {}/{}/{}",
                s.len(),
                row.len(),
                col.len()
            )));
        }

        let to_index = |v: f64, what: &str| -> Result<usize> {
            if v >= 1.0 && v.fract() == 0.0 {
                Ok(v as usize - 1)
            } else {
                Err(RemapError::invalid_matrix(format!("{what} index {v} is not 1-based")))
            }
        };

        let mut triplets = Vec::with_capacity(s.len());
        for k in 0..s.len() {
            triplets.push((to_index(row[k], "row")?, to_index(col[k], "col")?, s[k]));
        }

        let mut matrix = Self::from_triplets(n_a, n_b, &triplets)?;

        match Self::target_from_dataset(ds, n_b) {
            Ok(Some(target)) => matrix = matrix.with_target(target)?,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unusable destination grid description"),
        }

        debug!(
            n_a,
            n_b,
            nnz = matrix.nnz(),
            has_target = matrix.target.is_some(),
            "Loaded mapping matrix"
        );
        Ok(matrix)
    }

    fn target_from_dataset(ds: &Dataset, n_b: usize) -> Result<Option<TargetGrid>> {
        let (Ok(yc), Ok(xc)) = (ds.variable("yc_b"), ds.variable("xc_b")) else {
            return Ok(None);
        };

        let (nlon, nlat) = match ds.variable("dst_grid_dims") {
            Ok(dims) => {
                let dims = dims.values()?;
                match dims {
                    [nlon, nlat] => (*nlon as usize, *nlat as usize),
                    _ => return Err(RemapError::invalid_matrix("dst_grid_dims must have 2 entries")),
                }
            }
            Err(_) => return Err(RemapError::invalid_matrix("missing dst_grid_dims")),
        };
        if nlon * nlat != n_b {
            return Err(RemapError::shape_mismatch("dst_grid_dims", n_b, nlon * nlat));
        }

        let yv = ds.variable("yv_b").ok().map(|v| v.values()).transpose()?;
        let xv = ds.variable("xv_b").ok().map(|v| v.values()).transpose()?;

        TargetGrid::from_scrip(nlon, nlat, yc.values()?, xc.values()?, yv, xv).map(Some)
    }

    pub fn n_a(&self) -> usize {
        self.n_a
    }

    pub fn n_b(&self) -> usize {
        self.n_b
    }

    pub fn nnz(&self) -> usize {
        self.weights.len()
    }

    pub fn target(&self) -> Option<&TargetGrid> {
        self.target.as_ref()
    }

    /// `(source index, weight)` pairs of target row `j`.
    pub fn row(&self, j: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[j]..self.row_ptr[j + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    pub fn row_len(&self, j: usize) -> usize {
        self.row_ptr[j + 1] - self.row_ptr[j]
    }
}
