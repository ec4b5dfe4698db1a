//! `data` executor: CRUD over a [`RecordStore`].
//!
//! | Verb          | Parameters                  | Result           | Dry-run          |
//! |---------------|-----------------------------|------------------|------------------|
//! | `data.create` | `table`, `fields`           | `{"id"}`         | `{"id":"dry-run"}` |
//! | `data.update` | `table`, `id`, `fields`     | `{"rows"}`       | `{"rows":0}`     |
//! | `data.delete` | `table`, `id`               | `{"rows"}`       | `{"rows":0}`     |
//! | `data.get`    | `table`, `id`               | record or `null` | `null`           |
//! | `data.query`  | `table`, `filter`, `limit`  | array of records | `[]`             |

use procedo_core::Engine;
use procedo_core::engine::executor::{command_verb, unknown_verb};
use procedo_core::engine::{BoxFuture, CommandExecutor, EngineError, ExecutionContext};
use procedo_types::procedure::Command;
use serde_json::{Value, json};

use super::{object_param, required_string, resolve_param};
use crate::store::RecordStore;

/// Placeholder id returned by `data.create` in dry-run mode.
pub const DRY_RUN_ID: &str = "dry-run";

pub struct DataExecutor<S> {
    store: S,
}

impl<S: RecordStore> DataExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: RecordStore> CommandExecutor for DataExecutor<S> {
    fn category(&self) -> &str {
        "data"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            let verb = command_verb(command)?;
            if !matches!(verb, "create" | "update" | "delete" | "get" | "query") {
                return Err(unknown_verb(command));
            }
            let table = required_string(engine, command, "table", ctx)?;
            let dry_run = ctx.is_dry_run();

            match verb {
                "create" => {
                    let fields = object_param(engine, command, "fields", ctx)?;
                    if dry_run {
                        return Ok(json!({ "id": DRY_RUN_ID }));
                    }
                    let id = self.store.create(&table, &fields).await?;
                    tracing::debug!(table = %table, id = %id, "record created");
                    Ok(json!({ "id": id }))
                }
                "update" => {
                    let id = required_string(engine, command, "id", ctx)?;
                    let fields = object_param(engine, command, "fields", ctx)?;
                    if dry_run {
                        return Ok(json!({ "rows": 0 }));
                    }
                    let rows = self.store.update(&table, &id, &fields).await?;
                    Ok(json!({ "rows": rows }))
                }
                "delete" => {
                    let id = required_string(engine, command, "id", ctx)?;
                    if dry_run {
                        return Ok(json!({ "rows": 0 }));
                    }
                    let rows = self.store.delete(&table, &id).await?;
                    Ok(json!({ "rows": rows }))
                }
                "get" => {
                    let id = required_string(engine, command, "id", ctx)?;
                    if dry_run {
                        return Ok(Value::Null);
                    }
                    Ok(self
                        .store
                        .get(&table, &id)
                        .await?
                        .map_or(Value::Null, Value::Object))
                }
                _ => {
                    let filter = object_param(engine, command, "filter", ctx)?;
                    let limit = limit_param(engine, command, ctx)?;
                    if dry_run {
                        return Ok(json!([]));
                    }
                    let records = self.store.query(&table, &filter, limit).await?;
                    Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
                }
            }
        })
    }
}

/// `limit` accepts any non-negative integral number, including the floats
/// expressions tend to produce.
fn limit_param(
    engine: &Engine,
    command: &Command,
    ctx: &ExecutionContext,
) -> Result<Option<usize>, EngineError> {
    let Some(value) = resolve_param(engine, command, "limit", ctx)? else {
        return Ok(None);
    };
    let limit = value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .ok_or_else(|| {
            EngineError::failed(format!("'limit' must be a non-negative integer, got {value}"))
        })?;
    Ok(Some(usize::try_from(limit).unwrap_or(usize::MAX)))
}
