//! Numerical comparison of two output trees.
//!
//! Artifacts are matched by file name, which encodes variable, table,
//! experiment, grid and time range. Version directories are ignored; when
//! a tree holds several versions of a file the latest one is used.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cmip_common::is_fill;
use netcdf_parser::DatasetReader;
use serde::Serialize;
use tracing::{debug, info};

/// `allclose` tolerances: `|a - b| <= atol + rtol * |b|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { rtol: 1e-5, atol: 1e-8 }
    }
}

/// Elementwise closeness of two equally long arrays. Missing values only
/// match missing values.
pub fn allclose(a: &[f64], b: &[f64], tolerance: Tolerance) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(&x, &y)| match (is_fill(x), is_fill(y)) {
            (true, true) => true,
            (false, false) => (x - y).abs() <= tolerance.atol + tolerance.rtol * y.abs(),
            _ => false,
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub file: String,
    pub reason: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    /// Files present in both trees and compared.
    pub compared: usize,
    pub issues: Vec<Issue>,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.issues.is_empty()
    }

    fn issue(&mut self, file: &str, reason: impl Into<String>) {
        self.issues.push(Issue {
            file: file.to_string(),
            reason: reason.into(),
        });
    }
}

/// Compare every artifact of `reference` with its namesake in `candidate`.
pub fn compare_trees(
    reference: &Path,
    candidate: &Path,
    reader: &dyn DatasetReader,
    tolerance: Tolerance,
) -> Result<Comparison> {
    let expected = collect_artifacts(reference)?;
    let mut actual = collect_artifacts(candidate)?;
    let mut comparison = Comparison::default();

    for (name, reference_path) in &expected {
        let Some(candidate_path) = actual.remove(name) else {
            comparison.issue(name, "missing from the candidate tree");
            continue;
        };

        let variable = variable_of(name);
        let reference_ds = reader
            .read(reference_path, &[variable])
            .with_context(|| format!("Failed to read {}", reference_path.display()))?;
        let candidate_ds = reader
            .read(&candidate_path, &[variable])
            .with_context(|| format!("Failed to read {}", candidate_path.display()))?;
        let expected_var = reference_ds.variable(variable)?;
        let actual_var = candidate_ds.variable(variable)?;

        comparison.compared += 1;
        if expected_var.shape != actual_var.shape {
            comparison.issue(
                name,
                format!("shape {:?} differs from {:?}", actual_var.shape, expected_var.shape),
            );
        } else if !allclose(actual_var.values()?, expected_var.values()?, tolerance) {
            comparison.issue(name, "values do not match");
        } else {
            debug!(file = %name, "Artifacts match");
        }
    }

    for name in actual.keys() {
        comparison.issue(name, "missing from the reference tree");
    }

    info!(
        compared = comparison.compared,
        issues = comparison.issues.len(),
        "Comparison finished"
    );
    Ok(comparison)
}

/// File name → path of every `.nc` artifact under `root`. Paths are
/// visited in sorted order so later version directories win.
fn collect_artifacts(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let mut artifacts = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("nc") {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            artifacts.insert(name.to_string(), path.to_path_buf());
        }
    }
    Ok(artifacts)
}

/// Variable id of an artifact file name (`var_table_source_...nc`).
fn variable_of(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}
