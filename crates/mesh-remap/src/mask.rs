//! Cell validity masks over (level, cell).
//!
//! Masking runs before remapping so that land and below-bottom cells
//! never contribute to a target value.

use tracing::debug;

use crate::error::{RemapError, Result};
use crate::mesh::Mesh;

/// Vertical placement of a variable, which decides the mask shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// 2-D field (one level).
    Surface,
    /// Defined at layer centres (`nVertLevels`).
    LevelCentered,
    /// Defined at layer interfaces (`nVertLevels + 1`).
    LevelInterface,
}

/// Validity of each (level, cell) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CellMask {
    /// Independent validity per level, row-major `[level][cell]`.
    PerLevel {
        levels: usize,
        cells: usize,
        valid: Vec<bool>,
    },
    /// One surface mask reused for every level.
    Broadcast {
        levels: usize,
        cells: usize,
        surface: Vec<bool>,
    },
}

impl CellMask {
    pub fn levels(&self) -> usize {
        match self {
            Self::PerLevel { levels, .. } | Self::Broadcast { levels, .. } => *levels,
        }
    }

    pub fn cells(&self) -> usize {
        match self {
            Self::PerLevel { cells, .. } | Self::Broadcast { cells, .. } => *cells,
        }
    }

    /// Validity of every cell at `level`.
    pub fn level(&self, level: usize) -> &[bool] {
        match self {
            Self::PerLevel { cells, valid, .. } => &valid[level * cells..(level + 1) * cells],
            Self::Broadcast { surface, .. } => surface,
        }
    }

    pub fn is_valid(&self, level: usize, cell: usize) -> bool {
        self.level(level)[cell]
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast { .. })
    }

    /// Number of valid (level, cell) pairs.
    pub fn valid_count(&self) -> usize {
        (0..self.levels())
            .map(|k| self.level(k).iter().filter(|&&v| v).count())
            .sum()
    }
}

/// Surface validity: `maxLevelCell > 0`, or all valid without level data.
pub fn surface_mask(mesh: &Mesh) -> Vec<bool> {
    match &mesh.max_level_cell {
        Some(max) => max.iter().map(|&m| m > 0).collect(),
        None => vec![true; mesh.n_cells],
    }
}

/// The surface mask replicated over `levels` levels.
pub fn broadcast_mask(mesh: &Mesh, levels: usize) -> CellMask {
    CellMask::Broadcast {
        levels,
        cells: mesh.n_cells,
        surface: surface_mask(mesh),
    }
}

/// Build the validity mask for a variable of the given kind.
///
/// Layer-centred fields get genuine per-level validity
/// (`minLevelCell - 1 <= k < maxLevelCell`) when the mesh has
/// `maxLevelCell`. Interface fields reuse the surface mask at every level.
pub fn cell_mask(mesh: &Mesh, kind: VariableKind) -> CellMask {
    let mask = match kind {
        VariableKind::Surface => broadcast_mask(mesh, 1),
        VariableKind::LevelInterface => broadcast_mask(mesh, mesh.n_levels + 1),
        VariableKind::LevelCentered => match &mesh.max_level_cell {
            Some(max) => {
                let levels = mesh.n_levels;
                let cells = mesh.n_cells;
                let mut valid = Vec::with_capacity(levels * cells);
                for k in 0..levels as u32 {
                    for c in 0..cells {
                        let top = mesh
                            .min_level_cell
                            .as_ref()
                            .map_or(1, |min| min[c].max(1));
                        valid.push(top - 1 <= k && k < max[c]);
                    }
                }
                CellMask::PerLevel {
                    levels,
                    cells,
                    valid,
                }
            }
            None => broadcast_mask(mesh, mesh.n_levels),
        },
    };

    debug!(
        kind = ?kind,
        levels = mask.levels(),
        valid = mask.valid_count(),
        broadcast = mask.is_broadcast(),
        "Built cell mask"
    );
    mask
}

/// Replace invalid entries of a `[level][cell]` field with `fill`.
///
/// Returns the number of entries replaced.
pub fn apply(field: &mut [f64], levels: usize, cells: usize, mask: &CellMask, fill: f64) -> Result<usize> {
    if field.len() != levels * cells {
        return Err(RemapError::shape_mismatch("masked field", levels * cells, field.len()));
    }
    if mask.levels() != levels || mask.cells() != cells {
        return Err(RemapError::shape_mismatch(
            "cell mask",
            levels * cells,
            mask.levels() * mask.cells(),
        ));
    }

    let mut replaced = 0;
    for (k, row) in field.chunks_mut(cells.max(1)).enumerate().take(levels) {
        for (value, &valid) in row.iter_mut().zip(mask.level(k)) {
            if !valid {
                *value = fill;
                replaced += 1;
            }
        }
    }
    Ok(replaced)
}
