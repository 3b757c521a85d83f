//! The handler contract and the session driver shared by every family.

use cmip_common::{AxisDescriptor, ResolvedInputs, TimeSlice};
use cmor_session::{
    time_range_label, CoordinateTable, OutputSession, RunMetadata, SchemaContext, SchemaTable, SessionError,
    VariableScope,
};
use mesh_remap::RemapReport;
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, Result};
use crate::request::{HandlerOutcome, HandlerRequest};
use crate::variables::VariableSpec;

/// Converts raw model output into one published variable.
pub trait Handler: Send + Sync {
    /// Static description of the produced variable.
    fn spec(&self) -> &VariableSpec;

    fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Schema table, e.g. `Omon`.
    fn table(&self) -> &'static str {
        self.spec().table
    }

    fn raw_inputs(&self) -> Vec<&'static str> {
        self.spec().raw_inputs()
    }

    fn units(&self) -> &'static str {
        self.spec().units
    }

    fn best_effort(&self) -> bool {
        self.spec().best_effort
    }

    /// Produce the variable. Drives `session` from setup to close; the
    /// session is closed even when writing fails.
    fn handle(&self, request: &HandlerRequest<'_>, session: &mut dyn OutputSession) -> Result<HandlerOutcome>;
}

/// Produces the slices of one variable in time order.
pub(crate) trait SliceSource {
    fn len(&self) -> usize;

    fn slice(&mut self, index: usize) -> Result<TimeSlice>;

    fn coverage(&self) -> Option<RemapReport> {
        None
    }
}

/// Resolve every declared raw input, or fail before touching any output.
pub(crate) fn resolve_inputs(spec: &VariableSpec, request: &HandlerRequest<'_>) -> Result<ResolvedInputs> {
    request.raw_inputs.resolve_all(&spec.raw_inputs()).map_err(|e| {
        let cmip_common::RawInputError::Missing { keys } = e;
        let err = HandlerError::MissingInput {
            variable: spec.name.to_string(),
            key: keys.join(", "),
        };
        error!(variable = spec.name, error = %err, "Unable to find input files");
        err
    })
}

/// Run the axes and slices through `session`, closing it in every case.
pub(crate) fn run_session(
    spec: &VariableSpec,
    request: &HandlerRequest<'_>,
    session: &mut dyn OutputSession,
    axes: Vec<AxisDescriptor>,
    source: &mut dyn SliceSource,
) -> Result<HandlerOutcome> {
    let written = write_variable(spec, request, session, axes, source);
    let closed = session.close();

    match (written, closed) {
        (Ok(slices_written), Ok(artifacts)) => {
            info!(
                variable = spec.name,
                table = spec.table,
                slices = slices_written,
                artifacts = artifacts.len(),
                "Variable complete"
            );
            Ok(HandlerOutcome {
                variable: spec.name.to_string(),
                slices_written,
                artifacts,
                coverage: source.coverage(),
            })
        }
        (Err(e), closed) => {
            if let Err(close_error) = closed {
                warn!(variable = spec.name, error = %close_error, "Session close failed after error");
            }
            error!(variable = spec.name, error = %e, "Variable failed");
            Err(e)
        }
        (Ok(_), Err(e)) => {
            error!(variable = spec.name, error = %e, "Session close failed");
            Err(e.into())
        }
    }
}

fn write_variable(
    spec: &VariableSpec,
    request: &HandlerRequest<'_>,
    session: &mut dyn OutputSession,
    axes: Vec<AxisDescriptor>,
    source: &mut dyn SliceSource,
) -> Result<usize> {
    session.setup(&request.session_config(spec.name))?;
    session.load_table(spec.table)?;
    debug!(variable = spec.name, table = spec.table, "Session configured");

    let handles = session.register_axes(axes)?;
    let variable = session.register_variable(spec.name, spec.units, &handles)?;

    let mut scope = VariableScope::new(session, variable);
    let total = source.len();
    for index in 0..total {
        scope.write(source.slice(index)?)?;
    }
    scope.close()?;
    Ok(total)
}

/// Write the artifact directly through the request's writer factory,
/// without a session. Schema attributes are still copied verbatim.
pub(crate) fn write_simple(
    spec: &VariableSpec,
    request: &HandlerRequest<'_>,
    axes: Vec<AxisDescriptor>,
    source: &mut dyn SliceSource,
) -> Result<HandlerOutcome> {
    let result = simple_artifact(spec, request, &axes, source);
    match &result {
        Ok(outcome) => info!(
            variable = spec.name,
            slices = outcome.slices_written,
            "Variable written in simple mode"
        ),
        Err(e) => error!(variable = spec.name, error = %e, "Simple write failed"),
    }
    result
}

fn simple_artifact(
    spec: &VariableSpec,
    request: &HandlerRequest<'_>,
    axes: &[AxisDescriptor],
    source: &mut dyn SliceSource,
) -> Result<HandlerOutcome> {
    let table = SchemaTable::load(request.schema_root, spec.table)?;
    let coordinates = CoordinateTable::load(request.schema_root)?;
    let metadata = RunMetadata::load(request.metadata_path)?;

    let entry = table.variable(spec.name)?;
    if entry.units != spec.units {
        return Err(SessionError::UnitsMismatch {
            variable: spec.name.to_string(),
            expected: entry.units.clone(),
            actual: spec.units.to_string(),
        }
        .into());
    }
    let frequency = table.frequency(entry);

    let context = SchemaContext {
        table: &table,
        coordinates: &coordinates,
        metadata: &metadata,
        output_root: request.output_root,
    };
    let artifact = context.artifact_spec(spec.name, axes)?;

    let mut writer = request.writers.writer();
    writer.begin(&artifact)?;

    let mut written = 0;
    let mut span: Option<(f64, f64)> = None;
    let mut failure = None;
    for index in 0..source.len() {
        let step = source
            .slice(index)
            .and_then(|slice| writer.write_slice(index, &slice).map(|()| slice).map_err(HandlerError::from));
        match step {
            Ok(slice) => {
                written += 1;
                if let Some(stamp) = slice.time {
                    span = Some(span.map_or((stamp.value, stamp.value), |(first, _)| (first, stamp.value)));
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let range = span.and_then(|(first, last)| {
        let units = axes.first().filter(|a| a.is_time())?.units();
        time_range_label(&frequency, units, metadata.calendar(), first, last)
    });
    let finished = writer.finish(range.as_deref());

    if let Some(e) = failure {
        if let Err(finish_error) = finished {
            warn!(variable = spec.name, error = %finish_error, "Partial artifact not finalized");
        }
        return Err(e);
    }
    let path = finished?;
    Ok(HandlerOutcome {
        variable: spec.name.to_string(),
        slices_written: written,
        artifacts: vec![path],
        coverage: source.coverage(),
    })
}
