//! Masking and remapping of MPAS unstructured-mesh fields onto regular
//! latitude/longitude grids.
//!
//! # Pipeline
//!
//! ```text
//! MPAS field [time][level][cell]
//!      │
//!      ├─► cell_mask(mesh, kind)     land / below-bottom cells
//!      ├─► apply(field, mask)        invalid → fill sentinel
//!      │
//!      └─► RemapEngine::remap_levels(field, matrix)
//!               │   CSR row j:  Σ w(i,j) · s[i]  over valid i
//!               ▼
//!          [level][lat·lon]  + RemapReport
//! ```
//!
//! The mesh and mapping matrix are loaded once per handler invocation and
//! only borrowed afterwards.

pub mod config;
pub mod error;
pub mod mask;
pub mod matrix;
pub mod mesh;
pub mod remap;

pub use config::{Normalization, RemapConfig};
pub use error::{RemapError, Result};
pub use mask::{apply, broadcast_mask, cell_mask, surface_mask, CellMask, VariableKind};
pub use matrix::{MappingMatrix, TargetGrid};
pub use mesh::Mesh;
pub use remap::{RemapEngine, RemapOutput, RemapReport};
