//! Run metadata (`user_input.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cmip_common::Calendar;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Experiment-level metadata supplied by the user.
///
/// Named fields drive the output layout; every other key lands in `extra`
/// and is copied to the global attributes. Keys starting with `#` are
/// comments and dropped on load; keys starting with `_` are CMOR control
/// settings and never become attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    pub outpath: Option<PathBuf>,
    pub mip_era: String,
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub variant_label: String,
    pub grid_label: String,
    pub calendar: Option<String>,
    /// Version directory override, e.g. `v20190815`.
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            outpath: None,
            mip_era: "CMIP6".to_string(),
            activity_id: String::new(),
            institution_id: String::new(),
            source_id: String::new(),
            experiment_id: String::new(),
            variant_label: "r1i1p1f1".to_string(),
            grid_label: "gr".to_string(),
            calendar: None,
            version: None,
            extra: BTreeMap::new(),
        }
    }
}

impl RunMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| SessionError::metadata_load(&name, e))?;
        Self::from_json(&text).map_err(|e| match e {
            SessionError::MetadataLoad { reason, .. } => SessionError::metadata_load(&name, reason),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(text).map_err(|e| SessionError::metadata_load("<json>", e))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| SessionError::metadata_load("<json>", "top level is not an object"))?;
        object.retain(|key, _| !key.starts_with('#'));

        let metadata: Self = serde_json::from_value(value).map_err(|e| SessionError::metadata_load("<json>", e))?;
        metadata.validate().map_err(|e| SessionError::metadata_load("<json>", e))?;
        Ok(metadata)
    }

    /// Check the fields the output layout depends on.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let required = [
            ("activity_id", &self.activity_id),
            ("institution_id", &self.institution_id),
            ("source_id", &self.source_id),
            ("experiment_id", &self.experiment_id),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required keys: {}", missing.join(", ")));
        }
        if let Some(calendar) = &self.calendar {
            calendar.parse::<Calendar>().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Calendar declared in the metadata, noleap otherwise.
    pub fn calendar(&self) -> Calendar {
        self.calendar
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default()
    }

    /// Attributes copied onto every artifact.
    pub fn global_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        for (key, value) in [
            ("mip_era", &self.mip_era),
            ("activity_id", &self.activity_id),
            ("institution_id", &self.institution_id),
            ("source_id", &self.source_id),
            ("experiment_id", &self.experiment_id),
            ("variant_label", &self.variant_label),
            ("grid_label", &self.grid_label),
        ] {
            attrs.insert(key.to_string(), value.clone());
        }
        if let Some(calendar) = &self.calendar {
            attrs.insert("calendar".to_string(), calendar.clone());
        }
        for (key, value) in &self.extra {
            if key.starts_with('_') {
                continue;
            }
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            attrs.insert(key.clone(), text);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_user_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_utils::write_run_metadata(dir.path(), &dir.path().join("out"));
        let meta = RunMetadata::load(&path).unwrap();

        assert_eq!(meta.source_id, "E3SM-1-0");
        assert_eq!(meta.outpath.as_deref(), Some(dir.path().join("out").as_path()));
        assert_eq!(meta.calendar(), Calendar::NoLeap);

        let attrs = meta.global_attributes();
        assert_eq!(attrs["experiment_id"], "piControl");
        assert_eq!(attrs["contact"], "e3sm-data-support@llnl.gov");
        assert!(!attrs.contains_key("#note"));
        assert!(!attrs.contains_key("_control_vocabulary_file"));
        assert!(!attrs.contains_key("outpath"));
    }

    #[test]
    fn test_defaults() {
        let meta = RunMetadata::from_json(
            r#"{"activity_id": "CMIP", "institution_id": "E3SM-Project",
                "source_id": "E3SM-1-0", "experiment_id": "historical"}"#,
        )
        .unwrap();
        assert_eq!(meta.variant_label, "r1i1p1f1");
        assert_eq!(meta.grid_label, "gr");
        assert_eq!(meta.mip_era, "CMIP6");
    }

    #[test]
    fn test_missing_required_keys() {
        let err = RunMetadata::from_json(r#"{"activity_id": "CMIP"}"#).unwrap_err();
        match err {
            SessionError::MetadataLoad { reason, .. } => {
                assert!(reason.contains("source_id"));
                assert!(reason.contains("experiment_id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_calendar() {
        let err = RunMetadata::from_json(
            r#"{"activity_id": "CMIP", "institution_id": "E3SM-Project",
                "source_id": "E3SM-1-0", "experiment_id": "historical",
                "calendar": "julian-ish"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunMetadata::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SessionError::MetadataLoad { .. }));
    }
}
