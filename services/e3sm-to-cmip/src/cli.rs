//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::compare::Tolerance;
use crate::config::RunConfig;

#[derive(Parser, Debug)]
#[command(name = "e3sm-to-cmip")]
#[command(about = "Convert E3SM model output into CMIP-compliant artifacts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level
    #[arg(long, global = true, default_value = "info", env = "E3SM_TO_CMIP_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert raw output into CMIP artifacts
    Run(RunArgs),
    /// Compare two output trees numerically
    Compare(CompareArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// YAML run configuration; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the raw time series and MPAS files
    #[arg(short, long)]
    pub input_path: Option<PathBuf>,

    /// Root of the output tree
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// Directory holding the schema tables
    #[arg(short, long)]
    pub tables_path: Option<PathBuf>,

    /// Run metadata JSON
    #[arg(short, long)]
    pub user_metadata: Option<PathBuf>,

    /// Mapping file from the MPAS mesh to the output grid
    #[arg(long)]
    pub map: Option<PathBuf>,

    /// Variables to convert, comma separated, or `all`
    #[arg(short, long, value_delimiter = ',')]
    pub var_list: Vec<String>,

    /// Write gridded variables without the output session
    #[arg(long)]
    pub simple: bool,

    /// Directory for per-variable session logs
    #[arg(long)]
    pub logdir: Option<PathBuf>,

    /// Write the per-variable outcome as JSON
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

impl RunArgs {
    /// Flags as a configuration layer; unset flags leave the file's values.
    pub fn overrides(&self) -> RunConfig {
        let mut config = RunConfig {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            tables_path: self.tables_path.clone(),
            user_metadata: self.user_metadata.clone(),
            map: self.map.clone(),
            var_list: self.var_list.clone(),
            ..RunConfig::default()
        };
        config.options.simple = self.simple;
        config.options.log_directory = self.logdir.clone();
        config
    }
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Output tree taken as the reference
    pub reference: PathBuf,

    /// Output tree checked against the reference
    pub candidate: PathBuf,

    /// Relative tolerance
    #[arg(long, default_value_t = Tolerance::default().rtol)]
    pub rtol: f64,

    /// Absolute tolerance
    #[arg(long, default_value_t = Tolerance::default().atol)]
    pub atol: f64,
}

impl CompareArgs {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            rtol: self.rtol,
            atol: self.atol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "e3sm-to-cmip",
            "run",
            "-i",
            "/data/in",
            "-o",
            "/data/out",
            "-v",
            "tas,pr",
            "--simple",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.var_list, vec!["tas", "pr"]);

        let overrides = args.overrides();
        assert_eq!(overrides.input_path, Some(PathBuf::from("/data/in")));
        assert!(overrides.options.simple);
        assert!(overrides.tables_path.is_none());
    }

    #[test]
    fn test_parse_compare_defaults() {
        let cli = Cli::try_parse_from(["e3sm-to-cmip", "compare", "a", "b", "--json"]).unwrap();
        assert!(cli.json);
        let Command::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.tolerance(), Tolerance::default());
        assert_eq!(args.candidate, PathBuf::from("b"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["e3sm-to-cmip"]).is_err());
    }
}
