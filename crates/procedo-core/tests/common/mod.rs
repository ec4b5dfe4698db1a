//! Shared fixtures for engine behaviour tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use procedo_core::Engine;
use procedo_core::engine::{BoxFuture, CommandExecutor, EngineError, ExecutionContext};
use procedo_core::repository::ProcedureRepository;
use procedo_types::config::EngineConfig;
use procedo_types::error::RepositoryError;
use procedo_types::procedure::{Command, ProcedureDefinition};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Probe executor
// ---------------------------------------------------------------------------

/// Test leaf under the `probe` category.
///
/// - `probe.record` -- appends `label` to the log, returns `value` (or the label)
/// - `probe.fail` -- appends `label` if present, then fails
/// - `probe.flaky` -- fails until it has been called more than `failures` times
/// - `probe.vars` -- appends `vars:<sorted names>` to the log
#[derive(Clone, Default)]
pub struct Probe {
    pub log: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<AtomicU32>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandExecutor for Probe {
    fn category(&self) -> &str {
        "probe"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            let verb = command.category_and_verb().map(|(_, v)| v).unwrap_or("");
            let label = match command.param("label") {
                Some(raw) => Some(engine.resolver().resolve_value(raw, ctx.vars())?),
                None => None,
            };
            let label_text = label.as_ref().map(|l| match l {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });

            match verb {
                "record" => {
                    if let Some(text) = &label_text {
                        self.log.lock().unwrap().push(text.clone());
                    }
                    match command.param("value") {
                        Some(raw) => engine.resolver().resolve_value(raw, ctx.vars()),
                        None => Ok(label.unwrap_or(Value::Null)),
                    }
                }
                "fail" => {
                    if let Some(text) = &label_text {
                        self.log.lock().unwrap().push(text.clone());
                    }
                    Err(EngineError::failed("probe failure"))
                }
                "flaky" => {
                    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                    let failures = command
                        .param("failures")
                        .and_then(Value::as_u64)
                        .unwrap_or(u64::MAX);
                    if u64::from(call) <= failures {
                        Err(EngineError::failed(format!("flaky failure #{call}")))
                    } else {
                        Ok(json!(call))
                    }
                }
                "vars" => {
                    let mut names: Vec<_> = ctx.vars().keys().cloned().collect();
                    names.sort();
                    self.log
                        .lock()
                        .unwrap()
                        .push(format!("vars:{}", names.join(",")));
                    Ok(Value::Null)
                }
                _ => Err(EngineError::malformed(format!(
                    "unknown probe verb '{verb}'"
                ))),
            }
        })
    }
}

/// Fake HTTP leaf, used only to exercise the `integration` quota.
pub struct FakeIntegration;

impl CommandExecutor for FakeIntegration {
    fn category(&self) -> &str {
        "integration"
    }

    fn execute<'a>(
        &'a self,
        _command: &'a Command,
        _ctx: &'a mut ExecutionContext,
        _engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async { Ok(json!({ "status": 200 })) })
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MapRepository {
    definitions: HashMap<String, ProcedureDefinition>,
}

impl MapRepository {
    pub fn with(mut self, def: ProcedureDefinition) -> Self {
        self.definitions.insert(def.code.clone(), def);
        self
    }
}

impl ProcedureRepository for MapRepository {
    async fn get_published_definition(
        &self,
        code: &str,
    ) -> Result<Option<ProcedureDefinition>, RepositoryError> {
        Ok(self.definitions.get(code).cloned())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn engine_with(probe: &Probe, config: EngineConfig, repository: MapRepository) -> Engine {
    Engine::builder()
        .config(config)
        .repository(Arc::new(repository))
        .executor(probe.clone())
        .executor(FakeIntegration)
        .build()
        .unwrap()
}

pub fn engine(probe: &Probe) -> Engine {
    engine_with(probe, EngineConfig::default(), MapRepository::default())
}

pub fn record(label: &str) -> Command {
    Command::new("probe.record")
        .named(label)
        .with_param("label", json!(label))
}

pub fn fail(label: &str) -> Command {
    Command::new("probe.fail")
        .named(label)
        .with_param("label", json!(label))
}

/// A step that records `label` and registers a compensation recording
/// `undo-<label>`.
pub fn compensated(label: &str) -> Command {
    record(label).with_rollback(vec![record(&format!("undo-{label}"))])
}

pub fn procedure(code: &str, commands: Vec<Command>) -> ProcedureDefinition {
    let mut def = ProcedureDefinition::new(code);
    def.commands = commands;
    def
}

pub fn call(code: &str) -> Command {
    Command::new("flow.call").with_procedure(code)
}
