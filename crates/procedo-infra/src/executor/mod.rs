//! Leaf command executors.
//!
//! | Category       | Executor                 | Backing                      |
//! |----------------|--------------------------|------------------------------|
//! | `data`         | [`DataExecutor`]         | any [`RecordStore`]          |
//! | `integration`  | [`IntegrationExecutor`]  | reqwest + credential chain   |
//! | `notification` | [`NotificationExecutor`] | not implemented              |
//! | `wait`         | [`WaitExecutor`]         | not implemented              |
//!
//! [`RecordStore`]: crate::store::RecordStore

pub mod data;
pub mod integration;
pub mod stub;

use procedo_core::Engine;
use procedo_core::engine::{EngineError, ExecutionContext};
use procedo_types::procedure::Command;
use serde_json::{Map, Value};

pub use data::DataExecutor;
pub use integration::IntegrationExecutor;
pub use stub::{NotificationExecutor, WaitExecutor};

/// Resolve a leaf parameter. `null` counts as absent.
pub(crate) fn resolve_param(
    engine: &Engine,
    command: &Command,
    key: &str,
    ctx: &ExecutionContext,
) -> Result<Option<Value>, EngineError> {
    let Some(raw) = command.param(key) else {
        return Ok(None);
    };
    match engine.resolver().resolve_value(raw, ctx.vars())? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

/// Resolve a parameter that must be a string when present.
pub(crate) fn string_param(
    engine: &Engine,
    command: &Command,
    key: &str,
    ctx: &ExecutionContext,
) -> Result<Option<String>, EngineError> {
    match resolve_param(engine, command, key, ctx)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(EngineError::failed(format!(
            "'{}' parameter '{key}' must be a string, got {other}",
            command.command_type
        ))),
    }
}

/// Like [`string_param`] but the parameter must be present.
pub(crate) fn required_string(
    engine: &Engine,
    command: &Command,
    key: &str,
    ctx: &ExecutionContext,
) -> Result<String, EngineError> {
    string_param(engine, command, key, ctx)?.ok_or_else(|| {
        EngineError::malformed(format!("'{}' requires '{key}'", command.command_type))
    })
}

/// Resolve a parameter that must be an object when present. Absent means
/// an empty object.
pub(crate) fn object_param(
    engine: &Engine,
    command: &Command,
    key: &str,
    ctx: &ExecutionContext,
) -> Result<Map<String, Value>, EngineError> {
    match resolve_param(engine, command, key, ctx)? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(EngineError::failed(format!(
            "'{}' parameter '{key}' must be an object, got {other}",
            command.command_type
        ))),
    }
}
