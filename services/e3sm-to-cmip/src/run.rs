//! The `run` subcommand.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use cmor_handlers::{discover, HandlerRegistry, HandlerRequest, RunSummary, Runner};
use cmor_session::{OutputSession, RunMetadata, WriterFactory};
use netcdf_parser::DatasetReader;
use tracing::info;

use crate::config::RunSettings;

/// Convert every selected variable. Per-variable failures end up in the
/// summary; only problems that stop the whole run are errors.
pub fn execute<F>(
    settings: &RunSettings,
    reader: &dyn DatasetReader,
    writers: &dyn WriterFactory,
    new_session: F,
) -> Result<RunSummary>
where
    F: Fn() -> Box<dyn OutputSession>,
{
    let metadata = RunMetadata::load(&settings.user_metadata)
        .with_context(|| format!("Invalid run metadata {}", settings.user_metadata.display()))?;

    let registry = HandlerRegistry::builtin();
    let handlers = registry.resolve_selection(&settings.var_list)?;

    let keys: BTreeSet<&str> = handlers.iter().flat_map(|h| h.raw_inputs()).collect();
    let keys: Vec<&str> = keys.into_iter().collect();
    let raw = discover(&settings.input_path, settings.map.as_deref(), &keys)?;

    info!(
        variables = handlers.len(),
        inputs = raw.len(),
        experiment = %metadata.experiment_id,
        source = %metadata.source_id,
        "Starting conversion"
    );

    std::fs::create_dir_all(&settings.output_path)
        .with_context(|| format!("Failed to create output directory {}", settings.output_path.display()))?;

    let request = HandlerRequest {
        raw_inputs: &raw,
        schema_root: &settings.tables_path,
        metadata_path: &settings.user_metadata,
        output_root: Some(&settings.output_path),
        options: &settings.options,
        reader,
        writers,
    };

    Ok(Runner::new(new_session).run(&handlers, &request))
}
