//! Per-variable handlers turning raw E3SM output into CMIP artifacts.
//!
//! Each output variable is described by a static [`VariableSpec`] (raw
//! fields, schema table, units, derivation). The [`HandlerRegistry`] maps
//! names to one of three handler families:
//!
//! | Family | Tables | Path |
//! |--------|--------|------|
//! | [`GriddedHandler`] | Amon, Lmon | read, derive, write per month |
//! | [`FixedHandler`] | fx | read, derive, write once |
//! | [`MpasHandler`] | Omon, SImon | read, derive, mask, remap, write per month |
//!
//! Every handler drives exactly one [`cmor_session::OutputSession`] from
//! setup to close. The [`Runner`] executes a selection of handlers and
//! tolerates failures only for best-effort variables.

pub mod derivation;
pub mod discovery;
pub mod error;
pub mod grid;
pub mod gridded;
pub mod handler;
pub mod mpas;
pub mod options;
pub mod registry;
pub mod request;
pub mod runner;
pub mod variables;

pub use derivation::Derivation;
pub use discovery::discover;
pub use error::{DiscoveryError, HandlerError, RegistryError, Result};
pub use gridded::{FixedHandler, GriddedHandler};
pub use handler::Handler;
pub use mpas::MpasHandler;
pub use options::HandlerOptions;
pub use registry::{HandlerRegistry, ALL};
pub use request::{HandlerOutcome, HandlerRequest, DEFAULT_LOG_DIR};
pub use runner::{RunSummary, Runner, VariableFailure};
pub use variables::{MpasComponent, Source, VariableSpec, Vertical, BUILTIN};
