//! e3sm-to-cmip command line.
//!
//! Exits with 0 when every required variable converted (or both trees
//! matched) and with 1 otherwise.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cmor_session::{CmorSession, NetcdfWriterFactory, OutputSession};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use e3sm_to_cmip::{compare_trees, execute, load_run_config, Cli, Command, CompareArgs, RunArgs, RunConfig};

fn main() -> ExitCode {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level, cli.json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let outcome = match &cli.command {
        Command::Run(args) => run(args),
        Command::Compare(args) => compare(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = format!("{e:#}"), "Aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn run(args: &RunArgs) -> Result<bool> {
    let base = match &args.config {
        Some(path) => load_run_config(path)?,
        None => RunConfig::default(),
    };
    let settings = base.merge(args.overrides()).into_settings()?;
    info!(
        input = %settings.input_path.display(),
        output = %settings.output_path.display(),
        variables = ?settings.var_list,
        simple = settings.options.simple,
        "Starting e3sm-to-cmip"
    );

    let reader = netcdf_parser::default_reader()?;
    let writers = NetcdfWriterFactory;
    let summary = execute(&settings, reader.as_ref(), &writers, || {
        Box::new(CmorSession::netcdf()) as Box<dyn OutputSession>
    })?;

    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write run summary {}", path.display()))?;
    }

    for failure in &summary.failed {
        error!(variable = %failure.variable, error = %failure.error, "Variable failed");
    }
    info!(
        succeeded = summary.succeeded.len(),
        tolerated = summary.tolerated.len(),
        failed = summary.failed.len(),
        "Run finished"
    );
    Ok(summary.is_success())
}

fn compare(args: &CompareArgs) -> Result<bool> {
    let reader = netcdf_parser::default_reader()?;
    let comparison = compare_trees(&args.reference, &args.candidate, reader.as_ref(), args.tolerance())?;
    for issue in &comparison.issues {
        warn!(file = %issue.file, reason = %issue.reason, "Mismatch");
    }
    Ok(comparison.is_match())
}
