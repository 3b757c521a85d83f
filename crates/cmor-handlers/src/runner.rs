//! Batch execution of selected handlers, one session per variable.

use std::sync::Arc;
use std::time::Instant;

use cmor_session::OutputSession;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::handler::Handler;
use crate::request::{HandlerOutcome, HandlerRequest};

/// A variable that could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableFailure {
    pub variable: String,
    pub error: String,
}

/// What happened to every variable of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub succeeded: Vec<HandlerOutcome>,
    /// Failures of best-effort variables; they do not fail the run.
    pub tolerated: Vec<VariableFailure>,
    pub failed: Vec<VariableFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs handlers sequentially, giving each a fresh session.
pub struct Runner<F> {
    new_session: F,
}

impl<F> Runner<F>
where
    F: Fn() -> Box<dyn OutputSession>,
{
    pub fn new(new_session: F) -> Self {
        Self { new_session }
    }

    /// Run every handler. A failure never stops the batch; it is recorded
    /// as tolerated for best-effort handlers and as failed otherwise.
    pub fn run(&self, handlers: &[Arc<dyn Handler>], request: &HandlerRequest<'_>) -> RunSummary {
        let mut summary = RunSummary::default();
        let started = Instant::now();

        for handler in handlers {
            let mut session = (self.new_session)();
            let begun = Instant::now();
            match handler.handle(request, session.as_mut()) {
                Ok(outcome) => {
                    info!(
                        variable = handler.name(),
                        slices = outcome.slices_written,
                        duration_ms = begun.elapsed().as_millis() as u64,
                        "Variable converted"
                    );
                    summary.succeeded.push(outcome);
                }
                Err(e) => {
                    let failure = VariableFailure {
                        variable: handler.name().to_string(),
                        error: e.to_string(),
                    };
                    if handler.best_effort() {
                        warn!(variable = handler.name(), error = %e, "Best-effort variable failed, continuing");
                        summary.tolerated.push(failure);
                    } else {
                        error!(variable = handler.name(), error = %e, "Variable failed");
                        summary.failed.push(failure);
                    }
                }
            }
        }

        info!(
            succeeded = summary.succeeded.len(),
            tolerated = summary.tolerated.len(),
            failed = summary.failed.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        summary
    }
}
