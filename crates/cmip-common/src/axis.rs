//! Coordinate axis descriptors.
//!
//! An [`AxisDescriptor`] is the record handed to the output session for each
//! dimension of a variable. Spatial axes carry their coordinate values and
//! optional cell bounds verbatim from the raw files; the time axis carries
//! only units, since time values arrive with each written slice.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AxisError;

/// Ordering the schema requires for an axis' coordinate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredDirection {
    Increasing,
    Decreasing,
    #[default]
    Unspecified,
}

impl StoredDirection {
    /// Parse from a schema string (case-insensitive, empty = unspecified).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "increasing" => Self::Increasing,
            "decreasing" => Self::Decreasing,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for StoredDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Decreasing => write!(f, "decreasing"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Schema constraints on a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisRule {
    pub direction: StoredDirection,
    pub requires_bounds: bool,
}

impl AxisRule {
    pub const NONE: AxisRule = AxisRule {
        direction: StoredDirection::Unspecified,
        requires_bounds: false,
    };

    pub fn new(direction: StoredDirection, requires_bounds: bool) -> Self {
        Self {
            direction,
            requires_bounds,
        }
    }

    /// Built-in rule for the common CMIP axis entries, used when no
    /// coordinate table overrides it.
    pub fn builtin(table_entry: &str) -> Self {
        match table_entry {
            "latitude" | "longitude" | "depth_coord" | "olevel" | "sdepth" => {
                Self::new(StoredDirection::Increasing, true)
            }
            "depth_coord_half" | "olevhalf" => Self::new(StoredDirection::Increasing, false),
            entry if entry.starts_with("plev") => Self::new(StoredDirection::Decreasing, false),
            _ => Self::NONE,
        }
    }
}

/// Position class of an axis; determines dimension order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AxisRole {
    Time,
    Vertical,
    Other,
    Latitude,
    Longitude,
}

impl AxisRole {
    /// Classify a schema table entry.
    pub fn of(table_entry: &str) -> Self {
        match table_entry {
            "time" | "time1" | "time2" | "time3" => Self::Time,
            "latitude" => Self::Latitude,
            "longitude" => Self::Longitude,
            entry
                if entry.starts_with("depth")
                    || entry.starts_with("olev")
                    || entry.starts_with("plev")
                    || entry.starts_with("alev")
                    || entry.starts_with("sdepth")
                    || entry.starts_with("standard_") =>
            {
                Self::Vertical
            }
            _ => Self::Other,
        }
    }
}

/// A validated coordinate axis record.
///
/// Fields are private so the invariants checked in [`AxisDescriptor::new`]
/// hold for every value of this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisDescriptor {
    table_entry: String,
    units: String,
    coord_vals: Vec<f64>,
    cell_bounds: Option<Vec<[f64; 2]>>,
}

impl AxisDescriptor {
    /// Time axis: units only, values are supplied per slice.
    pub fn time(units: impl Into<String>) -> Self {
        Self {
            table_entry: "time".to_string(),
            units: units.into(),
            coord_vals: Vec::new(),
            cell_bounds: None,
        }
    }

    /// Spatial axis with coordinate values and optional bounds.
    pub fn new(
        table_entry: impl Into<String>,
        units: impl Into<String>,
        coord_vals: Vec<f64>,
        cell_bounds: Option<Vec<[f64; 2]>>,
    ) -> Result<Self, AxisError> {
        let table_entry = table_entry.into();

        if coord_vals.is_empty() {
            return Err(AxisError::Empty(table_entry));
        }

        if let Some(index) = coord_vals.iter().position(|v| !v.is_finite()) {
            return Err(AxisError::NonFinite {
                axis: table_entry,
                index,
            });
        }

        if let Some(bounds) = &cell_bounds {
            if bounds.len() != coord_vals.len() {
                return Err(AxisError::BoundsLength {
                    axis: table_entry,
                    values: coord_vals.len(),
                    bounds: bounds.len(),
                });
            }
        }

        Ok(Self {
            table_entry,
            units: units.into(),
            coord_vals,
            cell_bounds,
        })
    }

    pub fn table_entry(&self) -> &str {
        &self.table_entry
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn coord_vals(&self) -> &[f64] {
        &self.coord_vals
    }

    pub fn cell_bounds(&self) -> Option<&[[f64; 2]]> {
        self.cell_bounds.as_deref()
    }

    pub fn role(&self) -> AxisRole {
        AxisRole::of(&self.table_entry)
    }

    pub fn is_time(&self) -> bool {
        self.role() == AxisRole::Time
    }

    /// Declared dimension length; `None` for the (unlimited) time axis.
    pub fn len(&self) -> Option<usize> {
        if self.is_time() {
            None
        } else {
            Some(self.coord_vals.len())
        }
    }

    /// Check the descriptor against a schema rule.
    pub fn check_rule(&self, rule: &AxisRule) -> Result<(), AxisError> {
        if self.is_time() {
            return Ok(());
        }

        if rule.requires_bounds && self.cell_bounds.is_none() {
            return Err(AxisError::MissingBounds(self.table_entry.clone()));
        }

        let violated = match rule.direction {
            StoredDirection::Increasing => self.coord_vals.windows(2).position(|w| w[1] <= w[0]),
            StoredDirection::Decreasing => self.coord_vals.windows(2).position(|w| w[1] >= w[0]),
            StoredDirection::Unspecified => None,
        };

        match violated {
            Some(i) => Err(AxisError::NotMonotonic {
                axis: self.table_entry.clone(),
                direction: rule.direction,
                index: i + 1,
            }),
            None => Ok(()),
        }
    }
}

/// Convert a flattened `(n, 2)` bounds array into bound pairs.
pub fn bounds_from_flat(axis: &str, flat: &[f64]) -> Result<Vec<[f64; 2]>, AxisError> {
    if flat.len() % 2 != 0 {
        return Err(AxisError::BoundsLength {
            axis: axis.to_string(),
            values: flat.len() / 2,
            bounds: flat.len(),
        });
    }
    Ok(flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
}

struct PendingAxis {
    table_entry: String,
    units: String,
    coord_vals: Vec<f64>,
    cell_bounds: Option<Vec<[f64; 2]>>,
}

/// Assembles the axes of one output variable in schema dimension order
/// (time, vertical, latitude, longitude).
///
/// ```ignore
/// let axes = AxisBuilder::new()
///     .time("days since 1850-01-01")
///     .latitude(lat, Some(lat_bnds))
///     .longitude(lon, Some(lon_bnds))
///     .build()?;
/// ```
#[derive(Default)]
pub struct AxisBuilder {
    time_units: Option<String>,
    pending: Vec<PendingAxis>,
    rules: BTreeMap<String, AxisRule>,
}

impl AxisBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the rule for one table entry (e.g. from a coordinate table).
    pub fn with_rule(mut self, table_entry: impl Into<String>, rule: AxisRule) -> Self {
        self.rules.insert(table_entry.into(), rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = (String, AxisRule)>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn time(mut self, units: impl Into<String>) -> Self {
        self.time_units = Some(units.into());
        self
    }

    /// Add any spatial axis; its position is derived from the table entry.
    pub fn axis(
        mut self,
        table_entry: impl Into<String>,
        units: impl Into<String>,
        coord_vals: Vec<f64>,
        cell_bounds: Option<Vec<[f64; 2]>>,
    ) -> Self {
        self.pending.push(PendingAxis {
            table_entry: table_entry.into(),
            units: units.into(),
            coord_vals,
            cell_bounds,
        });
        self
    }

    pub fn latitude(self, coord_vals: Vec<f64>, cell_bounds: Option<Vec<[f64; 2]>>) -> Self {
        self.axis("latitude", "degrees_north", coord_vals, cell_bounds)
    }

    pub fn longitude(self, coord_vals: Vec<f64>, cell_bounds: Option<Vec<[f64; 2]>>) -> Self {
        self.axis("longitude", "degrees_east", coord_vals, cell_bounds)
    }

    fn rule_for(&self, table_entry: &str) -> AxisRule {
        self.rules
            .get(table_entry)
            .copied()
            .unwrap_or_else(|| AxisRule::builtin(table_entry))
    }

    /// Validate every axis and return them in dimension order.
    pub fn build(self) -> Result<Vec<AxisDescriptor>, AxisError> {
        let mut axes = Vec::with_capacity(self.pending.len() + 1);

        if let Some(units) = &self.time_units {
            axes.push(AxisDescriptor::time(units.clone()));
        }

        for pending in &self.pending {
            let descriptor = AxisDescriptor::new(
                pending.table_entry.clone(),
                pending.units.clone(),
                pending.coord_vals.clone(),
                pending.cell_bounds.clone(),
            )?;
            descriptor.check_rule(&self.rule_for(&pending.table_entry))?;
            axes.push(descriptor);
        }

        // Stable sort keeps insertion order within a role
        axes.sort_by_key(|a| a.role());

        for pair in axes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let singular = matches!(
                a.role(),
                AxisRole::Time | AxisRole::Vertical | AxisRole::Latitude | AxisRole::Longitude
            );
            if singular && a.role() == b.role() || a.table_entry == b.table_entry {
                return Err(AxisError::Duplicate(b.table_entry.clone()));
            }
        }

        Ok(axes)
    }
}
