//! `procedo list`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use procedo_core::procedure::definition::referenced_categories;
use procedo_types::procedure::ProcedureDefinition;

use crate::state::AppState;

pub fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let definitions = state.repository.list()?;

    if json {
        let out: Vec<_> = definitions
            .iter()
            .map(|d| {
                json!({
                    "code": d.code,
                    "name": d.name,
                    "version": d.version,
                    "commands": d.commands.len(),
                    "categories": categories(d),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if definitions.is_empty() {
        println!();
        println!(
            "  {} No procedures in {}",
            style("*").dim(),
            state.repository.root().display()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Code").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Version"),
            Cell::new("Commands"),
            Cell::new("Categories"),
        ]);

    for d in &definitions {
        table.add_row(vec![
            Cell::new(&d.code),
            Cell::new(d.name.as_deref().unwrap_or("-")),
            Cell::new(d.version.map_or_else(|| "-".to_string(), |v| v.to_string())),
            Cell::new(d.commands.len()),
            Cell::new(categories(d).join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn categories(definition: &ProcedureDefinition) -> Vec<String> {
    let mut categories: Vec<_> = referenced_categories(definition).into_iter().collect();
    categories.sort();
    categories
}
