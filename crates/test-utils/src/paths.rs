//! Locating external test data and creating scratch files.

use std::path::{Path, PathBuf};

/// Location of a checkout of the published CMIP6 CMOR tables, taken from
/// `CMIP6_TABLES_DIR`. Tests against the real tables are skipped without it.
pub fn find_cmip6_tables() -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var("CMIP6_TABLES_DIR").ok()?);
    [dir.join("Tables"), dir]
        .into_iter()
        .find(|d| d.join("CMIP6_Amon.json").is_file())
}

/// Creates an empty file so that existence checks on raw inputs pass when
/// the content itself is served by an in-memory reader.
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(&path, b"").expect("Failed to create placeholder file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_creates_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "ts/TREFHT_185001_185012.nc");
        assert!(path.is_file());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_tables_dir_without_amon_table_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("CMIP6_TABLES_DIR", dir.path());
        assert!(find_cmip6_tables().is_none());
    }
}
