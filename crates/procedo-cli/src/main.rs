//! Procedo CLI entry point.
//!
//! Binary name: `procedo`
//!
//! Parses CLI arguments, sets up tracing, wires the engine to its
//! collaborators, then dispatches to the command handler.

mod cli;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use procedo_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "procedo", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing(&TracingOptions {
        default_filter: cli::log_filter(cli.verbose, cli.quiet).to_string(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let outcome = dispatch(&cli).await;
    shutdown_tracing();

    match outcome? {
        true => Ok(ExitCode::SUCCESS),
        false => Ok(ExitCode::FAILURE),
    }
}

/// Run the selected command. `Ok(false)` means the command ran but
/// reported a failure (a failed execution or an invalid definition).
async fn dispatch(cli: &Cli) -> anyhow::Result<bool> {
    let state = AppState::init(cli).await?;

    match &cli.command {
        Commands::Run { target } => cli::run::handle_run(&state, target, false, cli.json).await,
        Commands::DryRun { target } => cli::run::handle_run(&state, target, true, cli.json).await,
        Commands::Validate { files } => cli::validate::handle_validate(&state, files, cli.json),
        Commands::List => cli::list::handle_list(&state, cli.json).map(|()| true),
        Commands::Audit { code, limit } => cli::audit::handle_audit(&state, code, *limit, cli.json)
            .await
            .map(|()| true),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
