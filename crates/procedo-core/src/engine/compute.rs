//! Built-in `compute` executor: pure value computation.
//!
//! - `compute.transform` -- resolve `values` into an object (the step result)
//! - `compute.set` -- same, and bind every key directly into the variables
//! - `compute.eval` -- evaluate `expression` and return its value

use procedo_types::procedure::Command;
use serde_json::Value;

use super::Engine;
use super::context::ExecutionContext;
use super::error::EngineError;
use super::executor::{BoxFuture, CommandExecutor, command_verb, required_field, unknown_verb};

pub struct ComputeExecutor;

impl CommandExecutor for ComputeExecutor {
    fn category(&self) -> &str {
        "compute"
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
                "transform" => {
                    require_values(command)?;
                    let values = resolver.resolve_map(&command.values, ctx.vars())?;
                    Ok(Value::Object(values))
                }
                "set" => {
                    require_values(command)?;
                    let values = resolver.resolve_map(&command.values, ctx.vars())?;
                    for (key, value) in &values {
                        ctx.set_var(key.clone(), value.clone());
                    }
                    Ok(Value::Object(values))
                }
                "eval" => {
                    let expression =
                        required_field(command.expression.as_deref(), command, "expression")?;
                    resolver.evaluate(expression, ctx.vars())
                }
                _ => Err(unknown_verb(command)),
            }
        })
    }
}

fn require_values(command: &Command) -> Result<(), EngineError> {
    let present = (!command.values.is_empty()).then_some(&command.values);
    required_field(present, command, "values").map(|_| ())
}
