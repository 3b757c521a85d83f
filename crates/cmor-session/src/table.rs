//! Schema tables.
//!
//! Tables are JSON documents in the layout of the published CMIP6 CMOR
//! tables: a `Header` object and a `variable_entry` map keyed by variable
//! name. The coordinate table (`CMIP6_coordinate.json`) instead has an
//! `axis_entry` map. Every value in these documents is a string.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cmip_common::{AxisRule, StoredDirection, FILL_VALUE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SessionError};

pub const COORDINATE_TABLE: &str = "CMIP6_coordinate.json";

/// Normalize `"Amon"` or `"CMIP6_Amon"` to `"CMIP6_Amon.json"`.
pub fn table_file_name(name: &str) -> String {
    let stem = name.trim_end_matches(".json");
    if stem.starts_with("CMIP6_") {
        format!("{stem}.json")
    } else {
        format!("CMIP6_{stem}.json")
    }
}

/// Find a table file under `schema_root` or `schema_root/Tables`.
pub fn locate_table(schema_root: &Path, name: &str) -> Option<PathBuf> {
    let file = table_file_name(name);
    [schema_root.join(&file), schema_root.join("Tables").join(&file)]
        .into_iter()
        .find(|p| p.is_file())
}

/// One `variable_entry` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableEntry {
    pub frequency: String,
    pub modeling_realm: String,
    pub standard_name: String,
    pub units: String,
    pub cell_methods: String,
    pub cell_measures: String,
    pub long_name: String,
    pub comment: String,
    pub dimensions: String,
    pub out_name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub positive: String,
}

impl VariableEntry {
    /// Attributes copied verbatim onto the output variable; empty values
    /// are omitted.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        [
            ("standard_name", &self.standard_name),
            ("long_name", &self.long_name),
            ("units", &self.units),
            ("cell_methods", &self.cell_methods),
            ("cell_measures", &self.cell_measures),
            ("comment", &self.comment),
            ("positive", &self.positive),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.split_whitespace()
    }
}

/// A loaded variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTable {
    pub file_name: String,
    pub header: BTreeMap<String, Value>,
    pub variables: BTreeMap<String, VariableEntry>,
}

#[derive(Deserialize)]
struct TableDocument {
    #[serde(rename = "Header", default)]
    header: BTreeMap<String, Value>,
    variable_entry: BTreeMap<String, VariableEntry>,
}

impl SchemaTable {
    /// Load `name` from under `schema_root`.
    pub fn load(schema_root: &Path, name: &str) -> Result<Self> {
        let file_name = table_file_name(name);
        let path = locate_table(schema_root, name).ok_or_else(|| {
            SessionError::schema_load(
                &file_name,
                format!("not found under {}", schema_root.display()),
            )
        })?;

        let text = std::fs::read_to_string(&path).map_err(|e| SessionError::schema_load(&file_name, e))?;
        let doc: TableDocument =
            serde_json::from_str(&text).map_err(|e| SessionError::schema_load(&file_name, e))?;

        debug!(
            table = %file_name,
            variables = doc.variable_entry.len(),
            "Loaded schema table"
        );

        Ok(Self {
            file_name,
            header: doc.header,
            variables: doc.variable_entry,
        })
    }

    fn header_str(&self, key: &str) -> Option<&str> {
        self.header.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Short table id (`"Amon"`), from the header or the file name.
    pub fn table_id(&self) -> String {
        match self.header_str("table_id") {
            Some(id) => id.trim_start_matches("Table ").to_string(),
            None => self
                .file_name
                .trim_end_matches(".json")
                .trim_start_matches("CMIP6_")
                .to_string(),
        }
    }

    pub fn realm(&self) -> Option<&str> {
        self.header_str("realm")
    }

    pub fn conventions(&self) -> Option<&str> {
        self.header_str("Conventions")
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.header_str(key)
    }

    /// Fill value from `missing_value` (string or number), 1e20 otherwise.
    pub fn missing_value(&self) -> f64 {
        match self.header.get("missing_value") {
            Some(Value::String(s)) => s.trim().parse().unwrap_or(FILL_VALUE),
            Some(Value::Number(n)) => n.as_f64().unwrap_or(FILL_VALUE),
            _ => FILL_VALUE,
        }
    }

    pub fn variable(&self, name: &str) -> Result<&VariableEntry> {
        self.variables
            .get(name)
            .ok_or_else(|| SessionError::unknown_entry(&self.file_name, name))
    }

    /// Frequency of `name`: the entry's own, else the header's.
    pub fn frequency(&self, entry: &VariableEntry) -> String {
        if !entry.frequency.is_empty() {
            entry.frequency.clone()
        } else {
            self.header_str("frequency").unwrap_or("").to_string()
        }
    }
}

/// One `axis_entry` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisEntry {
    pub standard_name: String,
    pub units: String,
    pub axis: String,
    pub long_name: String,
    pub out_name: String,
    pub stored_direction: String,
    pub must_have_bounds: String,
    pub positive: String,
    pub value: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl AxisEntry {
    pub fn rule(&self) -> AxisRule {
        AxisRule::new(
            StoredDirection::parse(&self.stored_direction),
            self.must_have_bounds.trim().eq_ignore_ascii_case("yes"),
        )
    }

    /// Entries with a fixed `value` are scalar (singleton) coordinates.
    pub fn is_scalar(&self) -> bool {
        !self.value.trim().is_empty()
    }

    /// Numeric value of a scalar coordinate.
    pub fn scalar_value(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    /// Attributes written on the coordinate variable; empty values omitted.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        [
            ("standard_name", &self.standard_name),
            ("long_name", &self.long_name),
            ("units", &self.units),
            ("axis", &self.axis),
            ("positive", &self.positive),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }

    fn new(out_name: &str, standard_name: &str, units: &str, axis: &str, rule: AxisRule) -> Self {
        Self {
            standard_name: standard_name.to_string(),
            units: units.to_string(),
            axis: axis.to_string(),
            long_name: standard_name.to_string(),
            out_name: out_name.to_string(),
            stored_direction: match rule.direction {
                StoredDirection::Unspecified => String::new(),
                d => d.to_string(),
            },
            must_have_bounds: if rule.requires_bounds { "yes" } else { "no" }.to_string(),
            data_type: "double".to_string(),
            ..Self::default()
        }
    }

    fn scalar(out_name: &str, standard_name: &str, units: &str, positive: &str, value: &str) -> Self {
        Self {
            positive: positive.to_string(),
            value: value.to_string(),
            ..Self::new(out_name, standard_name, units, "Z", AxisRule::NONE)
        }
    }
}

/// Axis definitions keyed by table entry name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateTable {
    pub entries: BTreeMap<String, AxisEntry>,
}

#[derive(Deserialize)]
struct CoordinateDocument {
    axis_entry: BTreeMap<String, AxisEntry>,
}

impl CoordinateTable {
    /// Entries for the axes the built-in handlers use, for when no
    /// coordinate table is installed.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        let mut add = |name: &str, entry: AxisEntry| {
            entries.insert(name.to_string(), entry);
        };
        let rule = AxisRule::builtin;

        add("time", AxisEntry::new("time", "time", "days since ?", "T", AxisRule::new(StoredDirection::Increasing, true)));
        add("latitude", AxisEntry::new("lat", "latitude", "degrees_north", "Y", rule("latitude")));
        add("longitude", AxisEntry::new("lon", "longitude", "degrees_east", "X", rule("longitude")));
        add("depth_coord", AxisEntry {
            positive: "down".to_string(),
            ..AxisEntry::new("lev", "depth", "m", "Z", rule("depth_coord"))
        });
        add("depth_coord_half", AxisEntry {
            positive: "down".to_string(),
            ..AxisEntry::new("lev", "depth", "m", "Z", rule("depth_coord_half"))
        });
        add("sdepth", AxisEntry {
            positive: "down".to_string(),
            ..AxisEntry::new("depth", "depth", "m", "Z", rule("sdepth"))
        });
        add("height2m", AxisEntry::scalar("height", "height", "m", "up", "2."));
        add("height10m", AxisEntry::scalar("height", "height", "m", "up", "10."));
        add("depth0m", AxisEntry::scalar("depth", "depth", "m", "down", "0."));
        add("typeland", AxisEntry::scalar("type", "area_type", "", "", "land"));
        add("typesi", AxisEntry::scalar("type", "area_type", "", "", "sea_ice"));

        Self { entries }
    }

    /// Load `CMIP6_coordinate.json` under `schema_root` and layer it over
    /// the built-in entries. Absence is not an error.
    pub fn load(schema_root: &Path) -> Result<Self> {
        let mut table = Self::builtin();
        let Some(path) = locate_table(schema_root, COORDINATE_TABLE) else {
            debug!("No coordinate table found, using built-in axis entries");
            return Ok(table);
        };

        let text = std::fs::read_to_string(&path).map_err(|e| SessionError::schema_load(COORDINATE_TABLE, e))?;
        let doc: CoordinateDocument =
            serde_json::from_str(&text).map_err(|e| SessionError::schema_load(COORDINATE_TABLE, e))?;
        table.entries.extend(doc.axis_entry);
        Ok(table)
    }

    pub fn get(&self, entry: &str) -> Option<&AxisEntry> {
        self.entries.get(entry)
    }

    /// Rules for every entry, for seeding an `AxisBuilder`.
    pub fn rules(&self) -> impl Iterator<Item = (String, AxisRule)> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_scalar())
            .map(|(name, e)| (name.clone(), e.rule()))
    }

    pub fn is_scalar(&self, entry: &str) -> bool {
        self.get(entry).is_some_and(AxisEntry::is_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_name() {
        assert_eq!(table_file_name("Amon"), "CMIP6_Amon.json");
        assert_eq!(table_file_name("CMIP6_Omon.json"), "CMIP6_Omon.json");
        assert_eq!(table_file_name("CMIP6_fx"), "CMIP6_fx.json");
    }

    #[test]
    fn test_load_from_tables_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_utils::write_schema_tables(dir.path());
        let table = SchemaTable::load(&root, "CMIP6_Amon.json").unwrap();
        assert_eq!(table.table_id(), "Amon");
        assert_eq!(table.realm(), Some("atmos"));
        assert_eq!(table.missing_value(), 1.0e20);

        let tas = table.variable("tas").unwrap();
        assert_eq!(tas.units, "K");
        assert_eq!(tas.attributes()["standard_name"], "air_temperature");
        assert!(!tas.attributes().contains_key("positive"));
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchemaTable::load(dir.path(), "CMIP6_Amon.json").unwrap_err();
        assert!(matches!(err, SessionError::SchemaLoad { .. }));
    }

    #[test]
    fn test_malformed_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CMIP6_Amon.json"), "{\"Header\": {}}").unwrap();
        let err = SchemaTable::load(dir.path(), "Amon").unwrap_err();
        assert!(matches!(err, SessionError::SchemaLoad { .. }));
    }

    #[test]
    fn test_unknown_variable() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_utils::write_schema_tables(dir.path());
        let table = SchemaTable::load(&root, "Amon").unwrap();
        assert!(matches!(
            table.variable("not_a_var"),
            Err(SessionError::UnknownTableEntry { .. })
        ));
    }

    #[test]
    fn test_coordinate_table_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_utils::write_schema_tables(dir.path());
        let coords = CoordinateTable::load(&root).unwrap();

        let lat = coords.get("latitude").unwrap();
        assert_eq!(lat.out_name, "lat");
        assert_eq!(lat.rule(), AxisRule::new(StoredDirection::Increasing, true));

        let half = coords.get("depth_coord_half").unwrap();
        assert!(!half.rule().requires_bounds);

        assert!(coords.is_scalar("height2m"));
        assert_eq!(coords.get("height2m").unwrap().scalar_value(), Some(2.0));
        assert!(coords.is_scalar("typesi"));
        assert_eq!(coords.get("typesi").unwrap().scalar_value(), None);
    }

    #[test]
    fn test_builtin_without_coordinate_table() {
        let dir = tempfile::tempdir().unwrap();
        let coords = CoordinateTable::load(dir.path()).unwrap();
        assert_eq!(coords.get("longitude").unwrap().out_name, "lon");
        assert!(coords.get("olevel").is_none());
    }

    #[test]
    fn test_published_tables() {
        let tables = test_utils::require_cmip6_tables!();
        let omon = SchemaTable::load(&tables, "Omon").unwrap();
        assert_eq!(omon.table_id(), "Omon");
        assert!(omon.variable("thetao").is_ok());
        let coords = CoordinateTable::load(&tables).unwrap();
        assert!(coords.get("depth_coord").is_some());
    }
}
