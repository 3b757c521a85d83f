//! Run configuration.
//!
//! A YAML file supplies defaults for a run; `${VAR}` and `${VAR:-default}`
//! references are expanded from the environment before parsing. Command
//! line flags are layered on top with [`RunConfig::merge`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cmor_handlers::{HandlerOptions, ALL};
use serde::{Deserialize, Serialize};

/// One layer of run configuration. Every field is optional so layers can
/// be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub tables_path: Option<PathBuf>,
    pub user_metadata: Option<PathBuf>,
    pub map: Option<PathBuf>,
    pub var_list: Vec<String>,
    pub options: HandlerOptions,
}

impl RunConfig {
    /// Layer `overrides` on top of `self`. Set paths and a non-empty
    /// variable list replace; `simple` is sticky once either layer sets it.
    pub fn merge(mut self, overrides: RunConfig) -> RunConfig {
        fn take(base: &mut Option<PathBuf>, over: Option<PathBuf>) {
            if over.is_some() {
                *base = over;
            }
        }

        take(&mut self.input_path, overrides.input_path);
        take(&mut self.output_path, overrides.output_path);
        take(&mut self.tables_path, overrides.tables_path);
        take(&mut self.user_metadata, overrides.user_metadata);
        take(&mut self.map, overrides.map);
        take(&mut self.options.log_directory, overrides.options.log_directory);
        if !overrides.var_list.is_empty() {
            self.var_list = overrides.var_list;
        }
        self.options.simple |= overrides.options.simple;
        self
    }

    /// Check required fields and produce the settings of a run.
    pub fn into_settings(self) -> Result<RunSettings> {
        let required = |value: Option<PathBuf>, flag: &str| {
            value.with_context(|| format!("{flag} is required (flag or config file)"))
        };

        let settings = RunSettings {
            input_path: required(self.input_path, "--input-path")?,
            output_path: required(self.output_path, "--output-path")?,
            tables_path: required(self.tables_path, "--tables-path")?,
            user_metadata: required(self.user_metadata, "--user-metadata")?,
            map: self.map,
            var_list: if self.var_list.is_empty() {
                vec![ALL.to_string()]
            } else {
                self.var_list
            },
            options: self.options,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Fully resolved inputs of a `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub tables_path: PathBuf,
    pub user_metadata: PathBuf,
    pub map: Option<PathBuf>,
    pub var_list: Vec<String>,
    pub options: HandlerOptions,
}

impl RunSettings {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.input_path.is_dir(),
            "input path {} is not a directory",
            self.input_path.display()
        );
        anyhow::ensure!(
            self.tables_path.is_dir(),
            "tables path {} is not a directory",
            self.tables_path.display()
        );
        anyhow::ensure!(
            self.user_metadata.is_file(),
            "run metadata {} does not exist",
            self.user_metadata.display()
        );
        if let Some(map) = &self.map {
            anyhow::ensure!(map.is_file(), "mapping file {} does not exist", map.display());
        }
        self.options
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid handler options: {e}"))?;
        Ok(())
    }
}

/// Read a YAML run configuration, expanding environment references.
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read run config from {}", path.display()))?;
    let expanded = expand_env_vars(&content).with_context(|| format!("In run config {}", path.display()))?;
    serde_yaml::from_str(&expanded).with_context(|| format!("Failed to parse run config {}", path.display()))
}

/// Replace `${VAR}` and `${VAR:-default}` with values from the environment.
/// An unset variable without a default is an error.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("Unclosed variable reference: ${{{after}"))?;
        out.push_str(&lookup(&after[..end])?);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => Ok(std::env::var(name.trim())
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())),
        None => std::env::var(expr.trim()).with_context(|| format!("Environment variable {expr} not set")),
    }
}
