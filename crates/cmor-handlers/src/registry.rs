//! Name to handler dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::RegistryError;
use crate::gridded::{FixedHandler, GriddedHandler};
use crate::handler::Handler;
use crate::mpas::MpasHandler;
use crate::variables::{Source, VariableSpec, BUILTIN};

/// Selection keyword meaning every registered variable.
pub const ALL: &str = "all";

/// Handlers keyed by output variable name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in variable.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in BUILTIN {
            registry.register(handler_for(*spec));
        }
        debug!(handlers = registry.handlers.len(), "Registered built-in handlers");
        registry
    }

    /// Add or replace the handler for its variable name.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn dispatch(&self, name: &str) -> Result<Arc<dyn Handler>, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownVariable(name.to_string()))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve a user selection to handlers, in request order with
    /// duplicates dropped. `all` selects every handler. Unknown names are
    /// reported together and nothing is returned.
    pub fn resolve_selection<S: AsRef<str>>(&self, selection: &[S]) -> Result<Vec<Arc<dyn Handler>>, RegistryError> {
        if selection.iter().any(|s| s.as_ref().trim() == ALL) {
            return Ok(self.handlers.values().cloned().collect());
        }

        let mut unknown = Vec::new();
        let mut picked: Vec<Arc<dyn Handler>> = Vec::new();
        for name in selection {
            let name = name.as_ref().trim();
            if name.is_empty() || picked.iter().any(|h| h.name() == name) {
                continue;
            }
            match self.handlers.get(name) {
                Some(handler) => picked.push(handler.clone()),
                None => unknown.push(name.to_string()),
            }
        }

        if unknown.is_empty() {
            Ok(picked)
        } else {
            Err(RegistryError::UnknownVariables(unknown))
        }
    }
}

fn handler_for(spec: VariableSpec) -> Arc<dyn Handler> {
    match spec.source {
        Source::Gridded { .. } => Arc::new(GriddedHandler::new(spec)),
        Source::Fixed { .. } => Arc::new(FixedHandler::new(spec)),
        Source::Mpas { .. } => Arc::new(MpasHandler::new(spec)),
    }
}
