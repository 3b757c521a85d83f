//! Sparse matrix-vector remap of mesh fields.
//!
//! `target[j] = Σ w(i, j) · source[i]` over the CSR row of `j`, with
//! masked sources (fill sentinel, NaN, or marked invalid) excluded.

use cmip_common::{is_fill, FILL_VALUE};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Normalization, RemapConfig};
use crate::error::{RemapError, Result};
use crate::matrix::MappingMatrix;

/// Per-remap counters. Masked targets are a soft condition: they are
/// written as fill and counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemapReport {
    /// Target values produced.
    pub targets: usize,
    /// Targets whose valid contributing weight fell below the threshold.
    pub masked_targets: usize,
    /// Targets whose matrix row has no weights at all.
    pub uncovered_rows: usize,
}

impl RemapReport {
    pub fn merge(&mut self, other: &RemapReport) {
        self.targets += other.targets;
        self.masked_targets += other.masked_targets;
        self.uncovered_rows += other.uncovered_rows;
    }

    /// Fraction of targets that received a value.
    pub fn coverage(&self) -> f64 {
        if self.targets == 0 {
            return 1.0;
        }
        1.0 - (self.masked_targets + self.uncovered_rows) as f64 / self.targets as f64
    }
}

/// Remapped field plus its report.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapOutput {
    pub data: Vec<f64>,
    pub report: RemapReport,
}

/// Applies a [`MappingMatrix`] to mesh fields.
#[derive(Debug, Clone, Default)]
pub struct RemapEngine {
    config: RemapConfig,
}

impl RemapEngine {
    pub fn new(config: RemapConfig) -> Result<Self> {
        config.validate().map_err(RemapError::ConfigError)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RemapConfig {
        &self.config
    }

    /// Remap one level of `n_a` source values to `n_b` targets.
    pub fn remap(&self, source: &[f64], matrix: &MappingMatrix) -> Result<RemapOutput> {
        self.remap_with_validity(source, None, matrix)
    }

    /// Like [`RemapEngine::remap`], with an explicit per-source validity
    /// slice in addition to fill detection.
    pub fn remap_with_validity(
        &self,
        source: &[f64],
        valid: Option<&[bool]>,
        matrix: &MappingMatrix,
    ) -> Result<RemapOutput> {
        if source.len() != matrix.n_a() {
            return Err(RemapError::shape_mismatch("remap source", matrix.n_a(), source.len()));
        }
        if let Some(valid) = valid {
            if valid.len() != source.len() {
                return Err(RemapError::shape_mismatch("validity mask", source.len(), valid.len()));
            }
        }

        let mut data = Vec::with_capacity(matrix.n_b());
        let mut report = RemapReport::default();

        for j in 0..matrix.n_b() {
            report.targets += 1;
            if matrix.row_len(j) == 0 {
                report.uncovered_rows += 1;
                data.push(FILL_VALUE);
                continue;
            }

            let mut acc = 0.0;
            let mut valid_weight = 0.0;
            for (i, w) in matrix.row(j) {
                let v = source[i];
                if is_fill(v) || valid.is_some_and(|m| !m[i]) {
                    continue;
                }
                acc += w * v;
                valid_weight += w;
            }

            if valid_weight.abs() < self.config.coverage_threshold || valid_weight == 0.0 {
                report.masked_targets += 1;
                data.push(FILL_VALUE);
                continue;
            }

            data.push(match self.config.normalization {
                Normalization::Conservative => acc,
                Normalization::Renormalize => acc / valid_weight,
            });
        }

        Ok(RemapOutput { data, report })
    }

    /// Remap a `[level][cell]` field level by level.
    ///
    /// Output is `[level][target]`. Levels are independent and are processed
    /// in parallel when `parallel_levels` is set.
    pub fn remap_levels(&self, field: &[f64], levels: usize, matrix: &MappingMatrix) -> Result<RemapOutput> {
        let n_a = matrix.n_a();
        if field.len() != levels * n_a {
            return Err(RemapError::shape_mismatch("remap field", levels * n_a, field.len()));
        }
        if levels == 0 {
            return Ok(RemapOutput {
                data: Vec::new(),
                report: RemapReport::default(),
            });
        }
        if n_a == 0 {
            return Err(RemapError::invalid_matrix("mapping has no source cells"));
        }

        let per_level: Vec<RemapOutput> = if self.config.parallel_levels && levels > 1 {
            field
                .par_chunks(n_a)
                .map(|level| self.remap(level, matrix))
                .collect::<Result<_>>()?
        } else {
            field
                .chunks(n_a)
                .map(|level| self.remap(level, matrix))
                .collect::<Result<_>>()?
        };

        let mut data = Vec::with_capacity(levels * matrix.n_b());
        let mut report = RemapReport::default();
        for out in per_level {
            data.extend(out.data);
            report.merge(&out.report);
        }

        if report.uncovered_rows > 0 {
            warn!(
                uncovered = report.uncovered_rows,
                "Mapping has target rows without weights"
            );
        }
        debug!(
            levels,
            targets = report.targets,
            masked = report.masked_targets,
            "Remapped field"
        );

        Ok(RemapOutput { data, report })
    }
}
