//! Procedure definition types.
//!
//! A procedure is an ordered list of [`Command`]s plus a result map. Commands
//! are tagged `category.verb`; the category selects the executor, the verb the
//! operation inside it. Flow-control payloads (`then`, `else`, `cases`, `try`,
//! `catch`, ...) nest further command lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ProcedureDefinition
// ---------------------------------------------------------------------------

/// A published, immutable procedure definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureDefinition {
    /// Unique procedure code used for lookup and call-stack tracking.
    pub code: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Published version number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Ordered command list.
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Output name -> expression, resolved against the final variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub result: BTreeMap<String, String>,
}

impl ProcedureDefinition {
    /// Create an empty definition with the given code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            description: None,
            version: None,
            commands: Vec::new(),
            result: BTreeMap::new(),
        }
    }

    /// Builder-style: append a command.
    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Builder-style: declare a result expression.
    pub fn with_result(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.result.insert(name.into(), expression.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One declarative instruction inside a procedure.
///
/// The YAML shape is flat; fields that do not belong to the engine-level
/// payload are collected into `params` for leaf executors:
/// ```yaml
/// - type: data.create
///   name: create-order
///   as: order
///   table: orders
///   fields:
///     total: "=input.total"
///   rollback:
///     - type: data.delete
///       table: orders
///       id: "=order.id"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// `category.verb`.
    #[serde(rename = "type")]
    pub command_type: String,
    /// Step name used in the trace and error messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Variable name the step result is bound to.
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Guard expression; the step is skipped when it resolves to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Downgrade a failure of this step to a warning.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Compensating commands registered once this step succeeds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<Command>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Value map for compute commands.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, Value>,
    /// Input map for sub-procedure calls.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, Value>,
    /// Target procedure code for `flow.call`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    #[serde(default, rename = "then", skip_serializing_if = "Vec::is_empty")]
    pub then_commands: Vec<Command>,
    #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
    pub else_commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cases: BTreeMap<String, Vec<Command>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<Command>>,
    #[serde(default, rename = "try", skip_serializing_if = "Vec::is_empty")]
    pub try_commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch: Option<Vec<Command>>,

    /// Leaf-specific fields (table, fields, credential, path, ...).
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Command {
    /// Create a command of the given `category.verb` type with no payload.
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            name: None,
            alias: None,
            when: None,
            optional: false,
            retry: None,
            rollback: Vec::new(),
            condition: None,
            expression: None,
            values: BTreeMap::new(),
            input: BTreeMap::new(),
            procedure: None,
            then_commands: Vec::new(),
            else_commands: Vec::new(),
            cases: BTreeMap::new(),
            default: None,
            try_commands: Vec::new(),
            catch: None,
            params: Map::new(),
        }
    }

    /// Split the type into `(category, verb)`.
    ///
    /// Returns `None` unless the type has exactly one dot with non-empty
    /// parts on both sides.
    pub fn category_and_verb(&self) -> Option<(&str, &str)> {
        let (category, verb) = self.command_type.split_once('.')?;
        if category.is_empty() || verb.is_empty() || verb.contains('.') {
            return None;
        }
        Some((category, verb))
    }

    /// Step name for traces: the declared name, else `<type>#<index>`.
    pub fn step_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}#{}", self.command_type, index + 1),
        }
    }

    /// Leaf parameter by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn guarded(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_rollback(mut self, commands: Vec<Command>) -> Self {
        self.rollback = commands;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn with_procedure(mut self, code: impl Into<String>) -> Self {
        self.procedure = Some(code.into());
        self
    }

    pub fn with_then(mut self, commands: Vec<Command>) -> Self {
        self.then_commands = commands;
        self
    }

    pub fn with_else(mut self, commands: Vec<Command>) -> Self {
        self.else_commands = commands;
        self
    }

    pub fn with_case(mut self, key: impl Into<String>, commands: Vec<Command>) -> Self {
        self.cases.insert(key.into(), commands);
        self
    }

    pub fn with_default(mut self, commands: Vec<Command>) -> Self {
        self.default = Some(commands);
        self
    }

    pub fn with_try(mut self, commands: Vec<Command>) -> Self {
        self.try_commands = commands;
        self
    }

    pub fn with_catch(mut self, commands: Vec<Command>) -> Self {
        self.catch = Some(commands);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded retry policy for a single step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts including the first (default 1).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt. Values
    /// below 1 are treated as 1.
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_attempts() -> u32 {
    1
}

fn default_delay_ms() -> u64 {
    100
}

fn default_backoff() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay_ms: u64, backoff: f64) -> Self {
        Self {
            attempts,
            delay_ms,
            backoff,
        }
    }

    /// Backoff multiplier with the floor of 1 applied.
    pub fn effective_backoff(&self) -> f64 {
        if self.backoff.is_finite() && self.backoff > 1.0 {
            self.backoff
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_and_verb() {
        assert_eq!(
            Command::new("data.create").category_and_verb(),
            Some(("data", "create"))
        );
        assert_eq!(Command::new("data").category_and_verb(), None);
        assert_eq!(Command::new(".create").category_and_verb(), None);
        assert_eq!(Command::new("data.").category_and_verb(), None);
        assert_eq!(Command::new("a.b.c").category_and_verb(), None);
    }

    #[test]
    fn test_step_name_falls_back_to_type_and_index() {
        assert_eq!(Command::new("compute.eval").step_name(0), "compute.eval#1");
        assert_eq!(
            Command::new("compute.eval").named("calc").step_name(4),
            "calc"
        );
    }

    #[test]
    fn test_effective_backoff_floor() {
        assert_eq!(RetryPolicy::new(3, 10, 0.5).effective_backoff(), 1.0);
        assert_eq!(RetryPolicy::new(3, 10, f64::NAN).effective_backoff(), 1.0);
        assert_eq!(RetryPolicy::new(3, 10, 2.0).effective_backoff(), 2.0);
    }

    #[test]
    fn test_yaml_command_collects_leaf_params() {
        let yaml = r#"
type: data.create
name: create-order
as: order
table: orders
fields:
  total: "=input.total"
rollback:
  - type: data.delete
    table: orders
    id: "=order.id"
"#;
        let cmd: Command = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(cmd.command_type, "data.create");
        assert_eq!(cmd.alias.as_deref(), Some("order"));
        assert_eq!(cmd.param("table"), Some(&json!("orders")));
        assert_eq!(cmd.param("fields"), Some(&json!({"total": "=input.total"})));
        assert_eq!(cmd.rollback.len(), 1);
        assert_eq!(cmd.rollback[0].param("id"), Some(&json!("=order.id")));
    }

    #[test]
    fn test_yaml_flow_payloads() {
        let yaml = r#"
code: route-order
commands:
  - type: flow.if
    condition: input.total > 100
    then:
      - type: compute.set
        values:
          tier: gold
    else:
      - type: compute.set
        values:
          tier: standard
  - type: flow.try
    try:
      - type: check.fail
        code: E1
        message: boom
    catch:
      - type: compute.eval
        expression: error.code
result:
  tier: tier
"#;
        let def: ProcedureDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.code, "route-order");
        assert_eq!(def.commands.len(), 2);
        assert_eq!(def.commands[0].then_commands.len(), 1);
        assert_eq!(def.commands[0].else_commands.len(), 1);
        assert_eq!(def.commands[1].try_commands.len(), 1);
        assert_eq!(def.commands[1].catch.as_ref().map(Vec::len), Some(1));
        assert_eq!(def.result.get("tier").map(String::as_str), Some("tier"));
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy: RetryPolicy = serde_yaml_ng::from_str("attempts: 3").unwrap();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay_ms, 100);
        assert_eq!(policy.backoff, 1.0);
    }
}
