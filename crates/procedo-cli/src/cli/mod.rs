//! CLI command definitions for the `procedo` binary.

pub mod audit;
pub mod list;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Run and check declarative procedures.
#[derive(Parser)]
#[command(name = "procedo", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Directory holding `<code>.yaml` procedure files.
    #[arg(long, global = true, env = "PROCEDO_PROCEDURES", default_value = "procedures")]
    pub procedures: PathBuf,

    /// Directory searched for `procedo.toml`.
    #[arg(long, global = true, env = "PROCEDO_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,

    /// Backing store for `data` commands and the integration audit log.
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Sqlite)]
    pub store: StoreKind,

    /// SQLite database URL (defaults to `~/.procedo/procedo.db`).
    #[arg(long, global = true, env = "PROCEDO_DATABASE_URL")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Records live for one invocation; audit goes to the log.
    Memory,
    Sqlite,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a procedure.
    Run {
        #[command(flatten)]
        target: RunTarget,
    },

    /// Simulate a procedure without side effects.
    #[command(name = "dry-run")]
    DryRun {
        #[command(flatten)]
        target: RunTarget,
    },

    /// Check procedure files (all files in the procedures directory when
    /// none are given).
    Validate {
        files: Vec<PathBuf>,
    },

    /// List the procedures in the procedures directory.
    #[command(alias = "ls")]
    List,

    /// Show recorded integration calls for a procedure.
    Audit {
        /// Procedure code.
        code: String,

        /// Maximum number of records to display.
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// What to run and with which input.
#[derive(clap::Args)]
pub struct RunTarget {
    /// Procedure code, looked up in the procedures directory.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub code: Option<String>,

    /// Run a definition file directly instead of looking up a code.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Input as a JSON object.
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the JSON input from a file.
    #[arg(long)]
    pub input_file: Option<PathBuf>,
}

/// Log filter for a verbosity level.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,procedo_core=debug,procedo_infra=debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_requires_code_or_file() {
        assert!(Cli::try_parse_from(["procedo", "run"]).is_err());
        assert!(Cli::try_parse_from(["procedo", "run", "a", "--file", "a.yaml"]).is_err());

        let cli = Cli::try_parse_from(["procedo", "run", "reserve", "--input", "{}"]).unwrap();
        match cli.command {
            Commands::Run { target } => {
                assert_eq!(target.code.as_deref(), Some("reserve"));
                assert_eq!(target.input.as_deref(), Some("{}"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["procedo", "dry-run", "--file", "x.yaml", "--json", "-vv", "--store", "memory"])
                .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.store, StoreKind::Memory);
        assert!(matches!(cli.command, Commands::DryRun { .. }));
    }

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "warn");
        assert!(log_filter(1, false).contains("procedo_core=debug"));
        assert_eq!(log_filter(3, false), "trace");
    }
}
