//! `procedo run` and `procedo dry-run`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use procedo_core::ExecutionOptions;
use procedo_core::procedure::definition::load_procedure_file;
use procedo_types::execution::{TraceEntry, TraceStatus};
use procedo_types::procedure::ProcedureDefinition;

use super::RunTarget;
use crate::state::AppState;

/// Execute (or simulate) a procedure and print the outcome.
///
/// Returns whether the execution succeeded.
pub async fn handle_run(
    state: &AppState,
    target: &RunTarget,
    dry_run: bool,
    json: bool,
) -> Result<bool> {
    let definition = load_target(state, target).await?;
    let input = parse_input(target.input.as_deref(), target.input_file.as_deref()).await?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling execution");
                cancel.cancel();
            }
        })
    };

    let options = ExecutionOptions {
        dry_run,
        cancel: Some(cancel),
    };
    let outcome = state
        .engine
        .execute_definition(&definition, input, options)
        .await;
    watcher.abort();

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!();
                println!(
                    "  {} {} '{}'",
                    style("✓").green().bold(),
                    if dry_run { "Simulated" } else { "Executed" },
                    style(&definition.code).cyan()
                );
                print_trace(&result.trace);
                for warning in &result.warnings {
                    println!("  {} {warning}", style("!").yellow().bold());
                }
                if !result.warnings.is_empty() {
                    println!();
                }
                println!("{}", serde_json::to_string_pretty(&result.result)?);
                println!();
            }
            Ok(true)
        }
        Err(failure) => {
            if json {
                let out = json!({
                    "success": false,
                    "error": failure.error.to_string(),
                    "rollback_error": failure.rollback_error.as_ref().map(ToString::to_string),
                    "warnings": failure.warnings,
                    "trace": failure.trace,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} '{}' failed",
                    style("✗").red().bold(),
                    style(&definition.code).cyan()
                );
                print_trace(&failure.trace);
                println!("  {} {}", style("error:").red().bold(), failure.error);
                if let Some(rollback) = &failure.rollback_error {
                    println!("  {} {rollback}", style("rollback:").red().bold());
                }
                println!();
            }
            Ok(false)
        }
    }
}

async fn load_target(state: &AppState, target: &RunTarget) -> Result<ProcedureDefinition> {
    match (&target.file, &target.code) {
        (Some(path), _) => load_procedure_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        (None, Some(code)) => Ok(state.engine.load_definition(code).await?),
        (None, None) => bail!("a procedure code or --file is required"),
    }
}

/// Parse the run input. Absent input is an empty object.
pub async fn parse_input(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let raw = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Ok(json!({})),
    };
    let value: Value = serde_json::from_str(&raw).context("input is not valid JSON")?;
    if !value.is_object() {
        bail!("input must be a JSON object");
    }
    Ok(value)
}

fn print_trace(trace: &[TraceEntry]) {
    if trace.is_empty() {
        return;
    }
    println!();
    println!("{}", trace_table(trace));
    println!();
}

pub fn trace_table(trace: &[TraceEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);

    for entry in trace {
        table.add_row(vec![
            Cell::new(&entry.step),
            Cell::new(&entry.command_type),
            format_status(entry.status),
            Cell::new(format!("{}ms", entry.duration_ms)),
            Cell::new(entry.error.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

fn format_status(status: TraceStatus) -> Cell {
    let color = match status {
        TraceStatus::Ok => Color::Green,
        TraceStatus::Skipped => Color::DarkGrey,
        TraceStatus::Warning | TraceStatus::Retry => Color::Yellow,
        TraceStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_input_variants() {
        assert_eq!(parse_input(None, None).await.unwrap(), json!({}));
        assert_eq!(
            parse_input(Some(r#"{"sku":"A1"}"#), None).await.unwrap(),
            json!({ "sku": "A1" })
        );
        assert!(parse_input(Some("[1,2]"), None).await.is_err());
        assert!(parse_input(Some("{oops"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"qty": 2}"#).unwrap();

        let input = parse_input(None, Some(&path)).await.unwrap();
        assert_eq!(input["qty"], json!(2));
    }

    #[test]
    fn test_trace_table_lists_every_step() {
        let trace = vec![
            TraceEntry::new("reserve", "data.create", TraceStatus::Ok, 3),
            TraceEntry::new("charge", "integration.request", TraceStatus::Error, 12)
                .with_error("HTTP 503"),
        ];
        let rendered = trace_table(&trace).to_string();
        assert!(rendered.contains("reserve"));
        assert!(rendered.contains("integration.request"));
        assert!(rendered.contains("HTTP 503"));
        assert!(rendered.contains("12ms"));
    }
}
