//! `procedo audit`.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use procedo_infra::sqlite::SqliteAuditSink;

use crate::state::AppState;

pub async fn handle_audit(state: &AppState, code: &str, limit: i64, json: bool) -> Result<()> {
    let Some(pool) = &state.db_pool else {
        bail!("the audit log is only kept with --store sqlite");
    };
    let records = SqliteAuditSink::new(pool.clone())
        .for_procedure(code, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!();
    if records.is_empty() {
        println!(
            "  {} No integration calls recorded for '{}'",
            style("*").dim(),
            style(code).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("When").fg(Color::Cyan),
            Cell::new("Method"),
            Cell::new("URL"),
            Cell::new("Status"),
            Cell::new("Duration"),
            Cell::new("Credential"),
            Cell::new("Error"),
        ]);

    for r in &records {
        let status = match r.status {
            Some(code) if (200..300).contains(&code) => Cell::new(code).fg(Color::Green),
            Some(code) => Cell::new(code).fg(Color::Red),
            None => Cell::new("-").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(r.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(&r.method),
            Cell::new(&r.url),
            status,
            Cell::new(format!("{}ms", r.duration_ms)),
            Cell::new(r.credential.as_deref().unwrap_or("-")),
            Cell::new(r.error.as_deref().unwrap_or("-")),
        ]);
    }

    println!("  Integration calls for '{}'", style(code).cyan());
    println!("{table}");
    println!();
    Ok(())
}
