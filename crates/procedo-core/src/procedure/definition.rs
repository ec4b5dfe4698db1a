//! Procedure definition parsing, validation, and filesystem operations.
//!
//! Converts between YAML files and [`ProcedureDefinition`], validates
//! structural constraints (code format, well-formed command types, required
//! verb payloads, sane retry policies), and discovers procedure files on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use procedo_types::procedure::{Command, ProcedureDefinition};
use serde_json::Value;
use thiserror::Error;

use crate::engine::resolver::EXPRESSION_MARKER;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `ProcedureDefinition`.
pub fn parse_procedure_yaml(yaml: &str) -> Result<ProcedureDefinition, DefinitionError> {
    let def: ProcedureDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `ProcedureDefinition` to a YAML string.
pub fn serialize_procedure_yaml(def: &ProcedureDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `ProcedureDefinition`.
///
/// Checks:
/// - Code is non-empty and contains only alphanumerics, hyphens, underscores
/// - Every command (nested ones included) has a `category.verb` type
/// - Flow, compute and check verbs carry the fields they require
/// - Retry policies have at least one attempt and a finite backoff
/// - Result expressions are non-empty
///
/// Whether a category has a registered executor is checked by the engine,
/// not here.
pub fn validate_definition(def: &ProcedureDefinition) -> Result<(), DefinitionError> {
    if def.code.is_empty() {
        return Err(DefinitionError::ValidationError(
            "procedure code must not be empty".to_string(),
        ));
    }
    if !def
        .code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DefinitionError::ValidationError(format!(
            "procedure code '{}' contains invalid characters (only alphanumeric, '-' and '_' allowed)",
            def.code
        )));
    }

    validate_commands(&def.commands, "commands")?;

    for (name, expression) in &def.result {
        if expression.trim().is_empty() {
            return Err(DefinitionError::ValidationError(format!(
                "result entry '{name}' has an empty expression"
            )));
        }
    }

    Ok(())
}

fn validate_commands(commands: &[Command], path: &str) -> Result<(), DefinitionError> {
    for (index, command) in commands.iter().enumerate() {
        let here = format!("{path}[{index}]");
        validate_command(command, &here)?;
    }
    Ok(())
}

fn validate_command(command: &Command, path: &str) -> Result<(), DefinitionError> {
    let invalid = |reason: String| DefinitionError::ValidationError(format!("{path}: {reason}"));

    let Some((category, verb)) = command.category_and_verb() else {
        return Err(invalid(format!(
            "command type '{}' must have the form 'category.verb'",
            command.command_type
        )));
    };

    if let Some(retry) = &command.retry {
        if retry.attempts == 0 {
            return Err(invalid("retry.attempts must be >= 1".to_string()));
        }
        if !retry.backoff.is_finite() {
            return Err(invalid("retry.backoff must be a finite number".to_string()));
        }
    }

    let required = |field: &str, present: bool| {
        if present {
            Ok(())
        } else {
            Err(invalid(format!("'{}' requires '{field}'", command.command_type)))
        }
    };

    match (category, verb) {
        ("flow", "if") => required("condition", command.condition.is_some())?,
        ("flow", "switch") => required("expression", command.expression.is_some())?,
        ("flow", "call") => required("procedure", command.procedure.is_some())?,
        ("compute", "eval") => required("expression", command.expression.is_some())?,
        ("compute", "transform") | ("compute", "set") => {
            required("values", !command.values.is_empty())?
        }
        ("check", "validate") => required("condition", command.condition.is_some())?,
        _ => {}
    }

    validate_commands(&command.rollback, &format!("{path}.rollback"))?;
    validate_commands(&command.then_commands, &format!("{path}.then"))?;
    validate_commands(&command.else_commands, &format!("{path}.else"))?;
    validate_commands(&command.try_commands, &format!("{path}.try"))?;
    if let Some(catch) = &command.catch {
        validate_commands(catch, &format!("{path}.catch"))?;
    }
    for (key, case) in &command.cases {
        validate_commands(case, &format!("{path}.cases.{key}"))?;
    }
    if let Some(default) = &command.default {
        validate_commands(default, &format!("{path}.default"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Every category referenced anywhere in the definition, nested commands
/// included.
pub fn referenced_categories(def: &ProcedureDefinition) -> HashSet<String> {
    let mut categories = HashSet::new();
    visit_commands(&def.commands, &mut |command: &Command| {
        if let Some((category, _)) = command.category_and_verb() {
            categories.insert(category.to_string());
        }
    });
    categories
}

/// Every expression in the definition: guards, conditions, switch
/// expressions, marker-prefixed values and result entries.
pub fn collect_expressions(def: &ProcedureDefinition) -> Vec<String> {
    let mut expressions = Vec::new();
    visit_commands(&def.commands, &mut |command: &Command| {
        for text in [&command.when, &command.condition, &command.expression]
            .into_iter()
            .flatten()
        {
            push_expression(text, &mut expressions);
        }
        for value in command
            .values
            .values()
            .chain(command.input.values())
            .chain(command.params.values())
        {
            collect_marked(value, &mut expressions);
        }
    });
    for expression in def.result.values() {
        push_expression(expression, &mut expressions);
    }
    expressions
}

fn push_expression(text: &str, out: &mut Vec<String>) {
    let text = text.strip_prefix(EXPRESSION_MARKER).unwrap_or(text).trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

fn collect_marked(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if s.starts_with(EXPRESSION_MARKER) => push_expression(s, out),
        Value::Array(items) => items.iter().for_each(|item| collect_marked(item, out)),
        Value::Object(fields) => fields.values().for_each(|field| collect_marked(field, out)),
        _ => {}
    }
}

fn visit_commands(commands: &[Command], visit: &mut dyn FnMut(&Command)) {
    for command in commands {
        visit(command);
        visit_commands(&command.rollback, visit);
        visit_commands(&command.then_commands, visit);
        visit_commands(&command.else_commands, visit);
        visit_commands(&command.try_commands, visit);
        if let Some(catch) = &command.catch {
            visit_commands(catch, visit);
        }
        for case in command.cases.values() {
            visit_commands(case, visit);
        }
        if let Some(default) = &command.default {
            visit_commands(default, visit);
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a procedure definition from a YAML file.
pub fn load_procedure_file(path: &Path) -> Result<ProcedureDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_procedure_yaml(&content)
}

/// Save a procedure definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_procedure_file(path: &Path, def: &ProcedureDefinition) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_procedure_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all procedure YAML files directly under `base_dir`.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn discover_procedures(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, ProcedureDefinition)>, DefinitionError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    for entry in std::fs::read_dir(base_dir)? {
        let path = entry?.path();
        if !path.is_file() || !is_yaml(&path) {
            continue;
        }
        match load_procedure_file(&path) {
            Ok(def) => results.push((path, def)),
            Err(e) => {
                tracing::warn!(?path, error = %e, "skipping invalid procedure file");
            }
        }
    }
    results.sort_by(|a, b| a.1.code.cmp(&b.1.code));
    Ok(results)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
