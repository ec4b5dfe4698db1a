//! Built-in `flow` executor: branching, matching, sub-procedure calls and
//! try/catch.
//!
//! This is the only executor that recurses into the engine. Branch bodies run
//! against the caller's context; `flow.call` runs the target in a derived
//! child context.
//!
//! | Verb          | Result                                             |
//! |---------------|----------------------------------------------------|
//! | `flow.if`     | `{"branch": "then" \| "else"}`                     |
//! | `flow.switch` | `{"matched": <case key> \| "default" \| null}`     |
//! | `flow.call`   | the target's resolved result map                   |
//! | `flow.try`    | `{"caught": false}` or `{"caught": true, "error"}` |

use procedo_types::procedure::Command;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use super::Engine;
use super::context::{Compensation, ERROR_VAR, ExecutionContext};
use super::error::{EngineError, LimitViolation};
use super::executor::{BoxFuture, CommandExecutor, command_verb, required_field, unknown_verb};

pub struct FlowExecutor;

impl CommandExecutor for FlowExecutor {
    fn category(&self) -> &str {
        "flow"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            match command_verb(command)? {
                "if" => branch(command, ctx, engine).await,
                "switch" => switch(command, ctx, engine).await,
                "call" => call(command, ctx, engine).await,
                "try" => try_catch(command, ctx, engine).await,
                _ => Err(unknown_verb(command)),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// flow.if
// ---------------------------------------------------------------------------

async fn branch(
    command: &Command,
    ctx: &mut ExecutionContext,
    engine: &Engine,
) -> Result<Value, EngineError> {
    let condition = required_field(command.condition.as_deref(), command, "condition")?;
    if engine.resolver().evaluate_bool(condition, ctx.vars())? {
        engine.run_commands(&command.then_commands, ctx).await?;
        Ok(json!({ "branch": "then" }))
    } else {
        engine.run_commands(&command.else_commands, ctx).await?;
        Ok(json!({ "branch": "else" }))
    }
}

// ---------------------------------------------------------------------------
// flow.switch
// ---------------------------------------------------------------------------

async fn switch(
    command: &Command,
    ctx: &mut ExecutionContext,
    engine: &Engine,
) -> Result<Value, EngineError> {
    let expression = required_field(command.expression.as_deref(), command, "expression")?;
    let value = engine.resolver().evaluate(expression, ctx.vars())?;
    let key = case_key(&value);

    if let Some(commands) = command.cases.get(&key) {
        engine.run_commands(commands, ctx).await?;
        return Ok(json!({ "matched": key }));
    }
    if let Some(default) = &command.default {
        engine.run_commands(default, ctx).await?;
        return Ok(json!({ "matched": "default" }));
    }
    Ok(json!({ "matched": null }))
}

/// Render a switch value as a case key: strings verbatim, everything else
/// as compact JSON. Integral floats drop their fraction so `2.0` matches
/// case `"2"`.
fn case_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// flow.call
// ---------------------------------------------------------------------------

async fn call(
    command: &Command,
    ctx: &mut ExecutionContext,
    engine: &Engine,
) -> Result<Value, EngineError> {
    let target = required_field(command.procedure.as_deref(), command, "procedure")?;
    let code = match engine.resolver().evaluate_if_marked(target, ctx.vars())? {
        Value::String(code) => code,
        other => {
            return Err(EngineError::failed(format!(
                "procedure reference resolved to non-string value {other}"
            )));
        }
    };

    let max_depth = engine.config().max_call_depth;
    if ctx.call_depth() >= max_depth {
        return Err(LimitViolation::CallDepth {
            depth: ctx.call_depth() + 1,
            max: max_depth,
        }
        .into());
    }
    if ctx.is_on_stack(&code) {
        return Err(LimitViolation::CircularCall {
            procedure: code.clone(),
            stack: ctx.call_stack().join(" -> "),
        }
        .into());
    }

    let input = Value::Object(engine.resolver().resolve_map(&command.input, ctx.vars())?);

    if ctx.is_dry_run() {
        return Ok(json!({ "dry_run": true, "procedure": code, "input": input }));
    }

    let definition = engine.load_definition(&code).await?;
    let mut child = ctx.child(&code, input);
    debug!(procedure = %code, depth = child.call_depth(), "entering sub-procedure");

    if let Err(e) = engine.run_commands(&definition.commands, &mut child).await {
        if let Some(rollback_error) = engine.rollback(&mut child).await {
            error!(procedure = %code, error = %rollback_error, "sub-procedure rollback failed");
            child.add_warning(format!("rollback of '{code}' failed: {rollback_error}"));
        }
        ctx.absorb(&mut child);
        return Err(e.in_call(&code));
    }

    let result = engine.resolve_result(&definition.result, child.vars());
    ctx.absorb(&mut child);

    let compensations = child.take_compensations();
    if !compensations.is_empty() {
        let frame = child.into_vars();
        for compensation in compensations {
            ctx.push_compensation(Compensation {
                step: format!("{code}/{}", compensation.step),
                commands: compensation.commands,
                frame: Some(compensation.frame.unwrap_or_else(|| frame.clone())),
            });
        }
    }

    debug!(procedure = %code, "sub-procedure completed");
    Ok(Value::Object(result.into_iter().collect()))
}

// ---------------------------------------------------------------------------
// flow.try
// ---------------------------------------------------------------------------

async fn try_catch(
    command: &Command,
    ctx: &mut ExecutionContext,
    engine: &Engine,
) -> Result<Value, EngineError> {
    let error = match engine.run_commands(&command.try_commands, ctx).await {
        Ok(()) => return Ok(json!({ "caught": false })),
        Err(error) => error,
    };
    if error.is_fatal() {
        return Err(error);
    }
    let Some(catch) = &command.catch else {
        return Err(error);
    };

    let descriptor = error.catch_descriptor();
    info!(code = %descriptor.code, error = %error, "caught step failure");

    let previous = ctx.set_var(
        ERROR_VAR,
        json!({ "code": descriptor.code, "message": descriptor.message }),
    );
    let outcome = engine.run_commands(catch, ctx).await;
    match previous {
        Some(value) => {
            ctx.set_var(ERROR_VAR, value);
        }
        None => {
            ctx.remove_var(ERROR_VAR);
        }
    }
    outcome?;

    Ok(json!({
        "caught": true,
        "error": { "code": descriptor.code, "message": descriptor.message },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_key_rendering() {
        assert_eq!(case_key(&json!("gold")), "gold");
        assert_eq!(case_key(&json!(2)), "2");
        assert_eq!(case_key(&json!(2.0)), "2");
        assert_eq!(case_key(&json!(2.5)), "2.5");
        assert_eq!(case_key(&json!(true)), "true");
        assert_eq!(case_key(&json!(null)), "null");
        assert_eq!(case_key(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
