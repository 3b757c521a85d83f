//! Raw input key → file mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RawInputError;

/// Logical raw-input keys (`"MPASO"`, `"MPAS_mesh"`, `"TREFHT"`, ...) mapped
/// to the files that hold them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawVariableSet {
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl RawVariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one file under `key`, keeping insertion order.
    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.files.entry(key.into()).or_default().push(path.into());
    }

    pub fn with(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.insert(key, path);
        self
    }

    pub fn extend(&mut self, key: impl Into<String>, paths: impl IntoIterator<Item = PathBuf>) {
        self.files.entry(key.into()).or_default().extend(paths);
    }

    pub fn get(&self, key: &str) -> Option<&[PathBuf]> {
        self.files.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Existing files under `key`; empty when the key is absent or none of
    /// its files exist on disk.
    fn existing(&self, key: &str) -> Vec<PathBuf> {
        self.files
            .get(key)
            .map(|paths| paths.iter().filter(|p| p.is_file()).cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve every key in `keys` to at least one existing file.
    ///
    /// All unresolved keys are reported together, in request order.
    pub fn resolve_all<S: AsRef<str>>(&self, keys: &[S]) -> Result<ResolvedInputs, RawInputError> {
        let mut resolved = BTreeMap::new();
        let mut missing = Vec::new();

        for key in keys {
            let key = key.as_ref();
            let files = self.existing(key);
            if files.is_empty() {
                debug!(key, listed = self.get(key).map_or(0, <[PathBuf]>::len), "Raw input has no existing file");
                missing.push(key.to_string());
            } else {
                resolved.insert(key.to_string(), files);
            }
        }

        if missing.is_empty() {
            Ok(ResolvedInputs { files: resolved })
        } else {
            Err(RawInputError::Missing { keys: missing })
        }
    }
}

/// Inputs that passed [`RawVariableSet::resolve_all`]: every key has at
/// least one file that existed at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInputs {
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl ResolvedInputs {
    /// All files for `key`. Empty only for keys that were never requested.
    pub fn files(&self, key: &str) -> &[PathBuf] {
        self.files.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First file for `key` (mesh and mapping inputs are single files).
    pub fn first(&self, key: &str) -> Option<&Path> {
        self.files(key).first().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_all_present() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("TREFHT_185001_185012.nc");
        let b = dir.path().join("TREFHT_185101_185112.nc");
        fs::write(&a, b"").unwrap();
        fs::write(&b, b"").unwrap();

        let set = RawVariableSet::new().with("TREFHT", &a).with("TREFHT", &b);
        let resolved = set.resolve_all(&["TREFHT"]).unwrap();
        assert_eq!(resolved.files("TREFHT"), &[a.clone(), b]);
        assert_eq!(resolved.first("TREFHT"), Some(a.as_path()));
    }

    #[test]
    fn test_resolve_all_reports_every_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = dir.path().join("mpaso.rst.nc");
        fs::write(&mesh, b"").unwrap();

        let set = RawVariableSet::new()
            .with("MPAS_mesh", &mesh)
            .with("MPAS_map", dir.path().join("does_not_exist.nc"));

        let err = set.resolve_all(&["MPASO", "MPAS_mesh", "MPAS_map"]).unwrap_err();
        assert_eq!(
            err,
            RawInputError::Missing {
                keys: vec!["MPASO".to_string(), "MPAS_map".to_string()]
            }
        );
    }

    #[test]
    fn test_serde_transparent() {
        let set = RawVariableSet::new().with("PRECC", "/data/PRECC.nc");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"PRECC":["/data/PRECC.nc"]}"#);
    }
}
