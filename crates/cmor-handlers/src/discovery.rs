//! Locating raw input files by key in an E3SM output directory.

use std::path::{Path, PathBuf};

use cmip_common::RawVariableSet;
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::variables::{MPAS_MAP, MPAS_MESH};

const OCEAN_STATS: &str = "mpaso.hist.am.timeSeriesStatsMonthly";
const SEAICE_STATS: &str = "mpassi.hist.am.timeSeriesStatsMonthly";
const MESH_PATTERNS: [&str; 2] = ["mpaso.rst", "mpassi.rst"];

/// Build the raw variable set for `keys` from the netCDF files under
/// `input_dir`.
///
/// * `MPASO` / `MPASSI`: ocean and sea-ice monthly statistics.
/// * `MPAS_mesh`: the first ocean restart file, else a sea-ice restart.
/// * `MPAS_map`: `map_file`, when given.
/// * anything else: regular-grid time series named `{KEY}_*.nc`.
///
/// Keys without files are left out; handlers report them as missing inputs.
pub fn discover<S: AsRef<str>>(
    input_dir: &Path,
    map_file: Option<&Path>,
    keys: &[S],
) -> Result<RawVariableSet, DiscoveryError> {
    if !input_dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(input_dir.display().to_string()));
    }
    let files = netcdf_files(input_dir)?;
    debug!(dir = %input_dir.display(), files = files.len(), "Scanned input directory");

    let mut raw = RawVariableSet::new();
    for key in keys {
        let key = key.as_ref();
        let matched: Vec<PathBuf> = match key {
            "MPASO" => matching(&files, |name| name.contains(OCEAN_STATS)),
            "MPASSI" => matching(&files, |name| name.contains(SEAICE_STATS)),
            MPAS_MESH => MESH_PATTERNS
                .iter()
                .find_map(|pattern| files.iter().find(|p| file_name(p).contains(pattern)).cloned())
                .into_iter()
                .collect(),
            MPAS_MAP => map_file.map(Path::to_path_buf).into_iter().collect(),
            _ => {
                let prefix = format!("{key}_");
                matching(&files, |name| name.starts_with(&prefix))
            }
        };

        debug!(key, files = matched.len(), "Matched raw input");
        if !matched.is_empty() {
            raw.extend(key, matched);
        }
    }

    info!(dir = %input_dir.display(), keys = raw.len(), "Discovered raw inputs");
    Ok(raw)
}

/// Every `.nc` file below `dir`, sorted by path.
fn netcdf_files(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| DiscoveryError::Scan {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "nc") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn matching(files: &[PathBuf], accept: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    files.iter().filter(|p| accept(file_name(p))).cloned().collect()
}
