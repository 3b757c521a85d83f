//! In-memory dataset model.
//!
//! A [`Dataset`] holds the subset of a file a handler asked for: dimension
//! lengths, global attributes, and fully-read variables. Numeric variables
//! are stored as `f64` in row-major order regardless of their on-disk type;
//! character arrays (MPAS `xtime`) are stored as one string per record with
//! the string-length dimension removed.

use std::collections::BTreeMap;

use cmip_common::fill::FILL_VALUE;
use serde::Serialize;

use crate::error::{NetCdfError, NetCdfResult};

/// Dimension names treated as the record (time) dimension when
/// concatenating files.
pub const RECORD_DIMS: [&str; 2] = ["time", "Time"];

/// Attribute value, reduced to what the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Numbers(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl VarData {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fully-read variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub data: VarData,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl ArrayVariable {
    /// Numeric variable; fails if `data` does not fill `shape`.
    pub fn numeric<S: AsRef<str>>(
        name: &str,
        dims: &[S],
        shape: &[usize],
        data: Vec<f64>,
    ) -> NetCdfResult<Self> {
        Self::build(name, dims, shape, VarData::Numeric(data))
    }

    /// Text variable with one string per element of `shape`.
    pub fn text<S: AsRef<str>>(
        name: &str,
        dims: &[S],
        shape: &[usize],
        data: Vec<String>,
    ) -> NetCdfResult<Self> {
        Self::build(name, dims, shape, VarData::Text(data))
    }

    fn build<S: AsRef<str>>(
        name: &str,
        dims: &[S],
        shape: &[usize],
        data: VarData,
    ) -> NetCdfResult<Self> {
        if dims.len() != shape.len() {
            return Err(NetCdfError::InvalidFormat(format!(
                "variable '{}': {} dimension names for rank {}",
                name,
                dims.len(),
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(NetCdfError::ShapeMismatch {
                name: name.to_string(),
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.as_ref().to_string()).collect(),
            shape: shape.to_vec(),
            data,
            attributes: BTreeMap::new(),
        })
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_text)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr_text("units")
    }

    pub fn values(&self) -> NetCdfResult<&[f64]> {
        match &self.data {
            VarData::Numeric(v) => Ok(v),
            VarData::Text(_) => Err(NetCdfError::InvalidFormat(format!(
                "variable '{}' is text, expected numeric",
                self.name
            ))),
        }
    }

    pub fn strings(&self) -> NetCdfResult<&[String]> {
        match &self.data {
            VarData::Text(v) => Ok(v),
            VarData::Numeric(_) => Err(NetCdfError::InvalidFormat(format!(
                "variable '{}' is numeric, expected text",
                self.name
            ))),
        }
    }

    pub fn has_record_dim(&self) -> bool {
        self.dims
            .first()
            .is_some_and(|d| RECORD_DIMS.contains(&d.as_str()))
    }

    /// Number of records along the leading dimension.
    pub fn record_count(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Values per record (product of all but the leading dimension).
    pub fn record_size(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Values of record `index` along the leading dimension.
    pub fn record(&self, index: usize) -> NetCdfResult<&[f64]> {
        let values = self.values()?;
        let size = self.record_size();
        if index >= self.record_count() {
            return Err(NetCdfError::InvalidFormat(format!(
                "variable '{}': record {} out of {}",
                self.name,
                index,
                self.record_count()
            )));
        }
        Ok(&values[index * size..(index + 1) * size])
    }

    /// Replace values matching the variable's `_FillValue`/`missing_value`
    /// (and non-finite values) with the pipeline fill sentinel.
    pub fn normalize_fill(&mut self) {
        let declared: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|k| self.attributes.get(*k).and_then(AttrValue::as_f64))
            .collect();
        if let VarData::Numeric(values) = &mut self.data {
            for v in values.iter_mut() {
                if !v.is_finite() || declared.iter().any(|f| *f == *v) {
                    *v = FILL_VALUE;
                }
            }
        }
    }

    /// Reorder dimensions to `order`, which must be a permutation of `dims`.
    pub fn to_layout(&self, order: &[&str]) -> NetCdfResult<ArrayVariable> {
        let rank = self.dims.len();
        if order.len() != rank {
            return Err(NetCdfError::InvalidFormat(format!(
                "variable '{}': cannot reorder {:?} as {:?}",
                self.name, self.dims, order
            )));
        }

        let perm = order
            .iter()
            .map(|d| {
                self.dims
                    .iter()
                    .position(|x| x == d)
                    .ok_or_else(|| NetCdfError::MissingDimension(d.to_string()))
            })
            .collect::<NetCdfResult<Vec<usize>>>()?;

        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }

        let values = self.values()?;
        let new_shape: Vec<usize> = perm.iter().map(|&p| self.shape[p]).collect();

        let mut strides = vec![1usize; rank];
        for i in (0..rank.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }

        let mut out = Vec::with_capacity(values.len());
        let mut index = vec![0usize; rank];
        for _ in 0..values.len() {
            let src: usize = index
                .iter()
                .zip(&perm)
                .map(|(&i, &p)| i * strides[p])
                .sum();
            out.push(values[src]);
            for d in (0..rank).rev() {
                index[d] += 1;
                if index[d] < new_shape[d] {
                    break;
                }
                index[d] = 0;
            }
        }

        Ok(ArrayVariable {
            name: self.name.clone(),
            dims: order.iter().map(|d| d.to_string()).collect(),
            shape: new_shape,
            data: VarData::Numeric(out),
            attributes: self.attributes.clone(),
        })
    }
}

/// Dimensions, global attributes and variables read from one file (or a
/// concatenated series of files).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dims: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, ArrayVariable>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable, registering its dimensions.
    pub fn insert(&mut self, variable: ArrayVariable) -> NetCdfResult<()> {
        for (dim, &len) in variable.dims.iter().zip(&variable.shape) {
            match self.dims.get(dim) {
                Some(&existing) if existing != len => {
                    return Err(NetCdfError::InvalidFormat(format!(
                        "variable '{}': dimension '{}' has length {} but dataset has {}",
                        variable.name, dim, len, existing
                    )));
                }
                _ => {
                    self.dims.insert(dim.clone(), len);
                }
            }
        }
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    pub fn with(mut self, variable: ArrayVariable) -> NetCdfResult<Self> {
        self.insert(variable)?;
        Ok(self)
    }

    pub fn with_dim(mut self, name: &str, len: usize) -> Self {
        self.dims.insert(name.to_string(), len);
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> NetCdfResult<&ArrayVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| NetCdfError::MissingVariable {
                path: "<dataset>".to_string(),
                name: name.to_string(),
            })
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn dim(&self, name: &str) -> NetCdfResult<usize> {
        self.dims
            .get(name)
            .copied()
            .ok_or_else(|| NetCdfError::MissingDimension(name.to_string()))
    }

    /// Keep only the named variables (all if `names` is empty).
    pub fn select(mut self, names: &[&str]) -> Self {
        if !names.is_empty() {
            self.variables.retain(|k, _| names.contains(&k.as_str()));
        }
        self
    }

    /// Concatenate datasets along their record dimension.
    ///
    /// Variables without a record dimension are taken from the first
    /// dataset. Record variables must be present in every part with the
    /// same trailing shape.
    pub fn concat(parts: Vec<Dataset>) -> NetCdfResult<Dataset> {
        let mut parts = parts.into_iter();
        let mut merged = parts
            .next()
            .ok_or_else(|| NetCdfError::InvalidFormat("no datasets to concatenate".to_string()))?;

        for part in parts {
            for (name, var) in merged.variables.iter_mut() {
                if !var.has_record_dim() {
                    continue;
                }
                let other = part.variable(name)?;
                if other.shape.get(1..) != var.shape.get(1..) || other.dims != var.dims {
                    return Err(NetCdfError::InvalidFormat(format!(
                        "variable '{}': cannot concatenate shape {:?} onto {:?}",
                        name, other.shape, var.shape
                    )));
                }
                match (&mut var.data, &other.data) {
                    (VarData::Numeric(a), VarData::Numeric(b)) => a.extend_from_slice(b),
                    (VarData::Text(a), VarData::Text(b)) => a.extend(b.iter().cloned()),
                    _ => {
                        return Err(NetCdfError::InvalidFormat(format!(
                            "variable '{}': mixed text and numeric parts",
                            name
                        )))
                    }
                }
                var.shape[0] += other.shape[0];
            }

            for dim in RECORD_DIMS {
                if let (Some(total), Some(extra)) = (merged.dims.get(dim).copied(), part.dims.get(dim)) {
                    merged.dims.insert(dim.to_string(), total + extra);
                }
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(name: &str, months: usize, offset: f64) -> ArrayVariable {
        let data = (0..months * 2).map(|i| offset + i as f64).collect();
        ArrayVariable::numeric(name, &["Time", "nCells"], &[months, 2], data).unwrap()
    }

    #[test]
    fn test_shape_checked() {
        let err = ArrayVariable::numeric("x", &["a"], &[3], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, NetCdfError::ShapeMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_records() {
        let var = monthly("sst", 3, 0.0);
        assert_eq!(var.record_count(), 3);
        assert_eq!(var.record(1).unwrap(), &[2.0, 3.0]);
        assert!(var.record(3).is_err());
    }

    #[test]
    fn test_to_layout_transposes() {
        // (Time=1, nCells=2, nVertLevels=3) -> (Time, nVertLevels, nCells)
        let var = ArrayVariable::numeric(
            "temp",
            &["Time", "nCells", "nVertLevels"],
            &[1, 2, 3],
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0],
        )
        .unwrap();
        let t = var.to_layout(&["Time", "nVertLevels", "nCells"]).unwrap();
        assert_eq!(t.shape, vec![1, 3, 2]);
        assert_eq!(t.values().unwrap(), &[0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
    }

    #[test]
    fn test_normalize_fill() {
        let mut var = ArrayVariable::numeric("ts", &["x"], &[3], vec![1.0, -999.0, f64::NAN])
            .unwrap()
            .with_attr("_FillValue", -999.0);
        var.normalize_fill();
        assert_eq!(var.values().unwrap(), &[1.0, FILL_VALUE, FILL_VALUE]);
    }

    #[test]
    fn test_concat_along_record_dim() {
        let mesh = ArrayVariable::numeric("areaCell", &["nCells"], &[2], vec![1.0, 1.0]).unwrap();
        let a = Dataset::new()
            .with(monthly("sst", 2, 0.0))
            .unwrap()
            .with(mesh.clone())
            .unwrap();
        let b = Dataset::new()
            .with(monthly("sst", 1, 100.0))
            .unwrap()
            .with(mesh)
            .unwrap();

        let merged = Dataset::concat(vec![a, b]).unwrap();
        let sst = merged.variable("sst").unwrap();
        assert_eq!(sst.shape, vec![3, 2]);
        assert_eq!(sst.record(2).unwrap(), &[100.0, 101.0]);
        assert_eq!(merged.dim("Time").unwrap(), 3);
        assert_eq!(merged.variable("areaCell").unwrap().shape, vec![2]);
    }

    #[test]
    fn test_dimension_conflict() {
        let mut ds = Dataset::new().with_dim("nCells", 4);
        let var = ArrayVariable::numeric("x", &["nCells"], &[2], vec![0.0; 2]).unwrap();
        assert!(ds.insert(var).is_err());
    }
}
