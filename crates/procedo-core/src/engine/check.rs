//! Built-in `check` executor: raises structured procedure failures.
//!
//! - `check.fail` -- always raises `{code, message}` (code defaults to
//!   `PROCEDURE_FAILED`)
//! - `check.validate` -- raises when `condition` is false (code defaults to
//!   `VALIDATION_FAILED`), otherwise returns `true`
//!
//! `code` and `message` are leaf parameters and may be `=`-expressions.

use procedo_types::error::{DEFAULT_FAILURE_CODE, VALIDATION_FAILURE_CODE};
use procedo_types::procedure::Command;
use serde_json::{Map, Value};

use super::Engine;
use super::context::ExecutionContext;
use super::error::EngineError;
use super::executor::{BoxFuture, CommandExecutor, command_verb, required_field, unknown_verb};
use super::resolver::ExpressionResolver;

pub struct CheckExecutor;

impl CommandExecutor for CheckExecutor {
    fn category(&self) -> &str {
        "check"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            let resolver = engine.resolver();
            match command_verb(command)? {
                "fail" => {
                    let code = text_param(resolver, command, "code", ctx.vars())?
                        .unwrap_or_else(|| DEFAULT_FAILURE_CODE.to_string());
                    let message = text_param(resolver, command, "message", ctx.vars())?
                        .unwrap_or_else(|| "procedure failed".to_string());
                    Err(EngineError::raised(code, message))
                }
                "validate" => {
                    let condition =
                        required_field(command.condition.as_deref(), command, "condition")?;
                    if resolver.evaluate_bool(condition, ctx.vars())? {
                        return Ok(Value::Bool(true));
                    }
                    let code = text_param(resolver, command, "code", ctx.vars())?
                        .unwrap_or_else(|| VALIDATION_FAILURE_CODE.to_string());
                    let message = text_param(resolver, command, "message", ctx.vars())?
                        .unwrap_or_else(|| format!("validation failed: {condition}"));
                    Err(EngineError::raised(code, message))
                }
                _ => Err(unknown_verb(command)),
            }
        })
    }
}

/// Resolve an optional leaf parameter to text. Non-string values are
/// rendered as JSON; `null` counts as absent.
fn text_param(
    resolver: &ExpressionResolver,
    command: &Command,
    key: &str,
    vars: &Map<String, Value>,
) -> Result<Option<String>, EngineError> {
    let Some(raw) = command.param(key) else {
        return Ok(None);
    };
    Ok(match resolver.resolve_value(raw, vars)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
