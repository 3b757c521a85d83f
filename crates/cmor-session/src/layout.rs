//! Output directory and file naming.

use std::path::{Path, PathBuf};

use cmip_common::{Calendar, TimeUnits};
use tracing::warn;

use crate::metadata::RunMetadata;

/// DRS path builder for one run.
#[derive(Debug, Clone)]
pub struct OutputLayout<'a> {
    metadata: &'a RunMetadata,
    root: PathBuf,
    version: String,
}

impl<'a> OutputLayout<'a> {
    /// `root` overrides `metadata.outpath`; the current directory is the
    /// last resort.
    pub fn new(metadata: &'a RunMetadata, root: Option<&Path>) -> Self {
        let root = root
            .map(Path::to_path_buf)
            .or_else(|| metadata.outpath.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let version = metadata
            .version
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("v%Y%m%d").to_string());
        Self {
            metadata,
            root,
            version,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `root/mip_era/activity/institution/source/experiment/variant/table/var/grid/version`.
    pub fn directory(&self, table_id: &str, variable: &str) -> PathBuf {
        let m = self.metadata;
        [
            m.mip_era.as_str(),
            m.activity_id.as_str(),
            m.institution_id.as_str(),
            m.source_id.as_str(),
            m.experiment_id.as_str(),
            m.variant_label.as_str(),
            table_id,
            variable,
            m.grid_label.as_str(),
            self.version.as_str(),
        ]
        .iter()
        .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// `var_table_source_experiment_variant_grid`, without time range or extension.
    pub fn file_stem(&self, table_id: &str, variable: &str) -> String {
        let m = self.metadata;
        format!(
            "{variable}_{table_id}_{}_{}_{}_{}",
            m.source_id, m.experiment_id, m.variant_label, m.grid_label
        )
    }
}

/// Digits of the date stamp used in file names for a frequency.
pub fn range_digits(frequency: &str) -> Option<usize> {
    let base = frequency.trim_end_matches("Pt").trim_end_matches('C');
    match base {
        "fx" | "" => None,
        "yr" | "dec" => Some(4),
        "mon" => Some(6),
        "day" => Some(8),
        "6hr" | "3hr" => Some(10),
        "1hr" | "subhr" => Some(12),
        _ => Some(8),
    }
}

/// `start-end` label for the first and last time values, or `None` for
/// time-invariant frequencies or undecodable units.
pub fn time_range_label(frequency: &str, units: &str, calendar: Calendar, first: f64, last: f64) -> Option<String> {
    let digits = range_digits(frequency)?;
    let units = match TimeUnits::parse(units, calendar) {
        Ok(units) => units,
        Err(e) => {
            warn!(units = %units, error = %e, "Cannot decode time units for file name");
            return None;
        }
    };
    let start = units.decode(first).ok()?;
    let end = units.decode(last).ok()?;
    Some(format!("{}-{}", start.compact(digits), end.compact(digits)))
}
