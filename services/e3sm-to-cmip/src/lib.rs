//! Command line front end for the conversion pipeline.
//!
//! `run` discovers raw inputs, runs the selected handlers and writes one
//! artifact per variable. `compare` checks two output trees against each
//! other numerically.

pub mod cli;
pub mod compare;
pub mod config;
pub mod run;

pub use cli::{Cli, Command, CompareArgs, RunArgs};
pub use compare::{allclose, compare_trees, Comparison, Issue, Tolerance};
pub use config::{load_run_config, RunConfig, RunSettings};
pub use run::execute;
