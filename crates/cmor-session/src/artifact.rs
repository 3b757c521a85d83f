//! Building [`ArtifactSpec`]s from the schema and run metadata.

use std::collections::BTreeMap;
use std::path::Path;

use cmip_common::AxisDescriptor;

use crate::error::{Result, SessionError};
use crate::layout::OutputLayout;
use crate::metadata::RunMetadata;
use crate::table::{CoordinateTable, SchemaTable, VariableEntry, COORDINATE_TABLE};
use crate::writer::{ArtifactSpec, OutputAxis, ScalarCoordinate};

const DEFAULT_CONVENTIONS: &str = "CF-1.7 CMIP-6.2";
const HANDLE_PREFIX: &str = "hdl:21.14100/";

/// Everything needed to describe an artifact for a variable of one table.
#[derive(Debug, Clone, Copy)]
pub struct SchemaContext<'a> {
    pub table: &'a SchemaTable,
    pub coordinates: &'a CoordinateTable,
    pub metadata: &'a RunMetadata,
    /// Overrides `metadata.outpath`.
    pub output_root: Option<&'a Path>,
}

impl<'a> SchemaContext<'a> {
    pub fn output_name(entry: &VariableEntry, variable: &str) -> String {
        if entry.out_name.is_empty() {
            variable.to_string()
        } else {
            entry.out_name.clone()
        }
    }

    /// Table dimensions that need a registered axis (scalar coordinates
    /// excluded), in table order.
    pub fn axis_dimensions<'e>(&self, entry: &'e VariableEntry) -> Vec<&'e str> {
        entry
            .dimension_names()
            .filter(|dim| !self.coordinates.is_scalar(dim))
            .collect()
    }

    /// Describe the artifact for `variable` with `axes` in output order.
    pub fn artifact_spec(&self, variable: &str, axes: &[AxisDescriptor]) -> Result<ArtifactSpec> {
        let entry = self.table.variable(variable)?;
        let out_name = Self::output_name(entry, variable);
        let table_id = self.table.table_id();
        let frequency = self.table.frequency(entry);

        let layout = OutputLayout::new(self.metadata, self.output_root);
        let directory = layout.directory(&table_id, &out_name);
        let file_stem = layout.file_stem(&table_id, &out_name);

        let mut output_axes = Vec::with_capacity(axes.len());
        for descriptor in axes {
            let axis_entry = self
                .coordinates
                .get(descriptor.table_entry())
                .ok_or_else(|| SessionError::unknown_entry(COORDINATE_TABLE, descriptor.table_entry()))?;
            let name = if axis_entry.out_name.is_empty() {
                descriptor.table_entry().to_string()
            } else {
                axis_entry.out_name.clone()
            };
            let mut attributes = axis_entry.attributes();
            attributes.remove("units");
            if descriptor.is_time() {
                attributes.insert("calendar".to_string(), self.metadata.calendar().to_string());
            }
            output_axes.push(OutputAxis {
                name,
                descriptor: descriptor.clone(),
                attributes,
            });
        }

        let scalars = entry
            .dimension_names()
            .filter_map(|dim| {
                let axis_entry = self.coordinates.get(dim)?;
                let value = axis_entry.scalar_value()?;
                let name = if axis_entry.out_name.is_empty() {
                    dim.to_string()
                } else {
                    axis_entry.out_name.clone()
                };
                Some(ScalarCoordinate {
                    name,
                    value,
                    attributes: axis_entry.attributes(),
                })
            })
            .collect();

        let realm = if entry.modeling_realm.is_empty() {
            self.table.realm().unwrap_or_default().to_string()
        } else {
            entry.modeling_realm.clone()
        };

        let mut global_attributes: BTreeMap<String, String> = self.metadata.global_attributes();
        global_attributes.extend([
            (
                "creation_date".to_string(),
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
            ("tracking_id".to_string(), format!("{HANDLE_PREFIX}{}", uuid::Uuid::new_v4())),
            (
                "Conventions".to_string(),
                self.table.conventions().unwrap_or(DEFAULT_CONVENTIONS).to_string(),
            ),
            ("table_id".to_string(), table_id),
            ("frequency".to_string(), frequency),
            ("realm".to_string(), realm),
            ("variable_id".to_string(), out_name.clone()),
        ]);
        for key in ["data_specs_version", "product"] {
            if let Some(value) = self.table.header_value(key) {
                global_attributes.insert(key.to_string(), value.to_string());
            }
        }

        Ok(ArtifactSpec {
            variable: out_name,
            directory,
            file_stem,
            axes: output_axes,
            scalars,
            variable_attributes: entry.attributes(),
            global_attributes,
            fill_value: self.table.missing_value(),
        })
    }
}
