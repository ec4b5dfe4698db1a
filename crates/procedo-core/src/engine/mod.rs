//! Procedure execution engine.
//!
//! The engine interprets a procedure's command list one step at a time:
//! - `context` -- per-execution mutable scope (vars, stacks, counters, trace)
//! - `executor` -- `CommandExecutor` extension point and category registry
//! - `resolver` -- marker-prefixed value resolution through the expression service
//! - `retry` -- bounded retry with backoff under the execution deadline
//! - `rollback` -- saga runner unwinding registered compensations
//! - `flow`, `compute`, `check` -- built-in executors
//!
//! Every step goes through the same pipeline: limit, cancellation and
//! deadline checks; guard evaluation; counter accounting; dispatch (with
//! retry); then either alias binding and compensation registration, or the
//! optional-failure downgrade / abort.

pub mod check;
pub mod compute;
pub mod context;
pub mod error;
pub mod executor;
pub mod flow;
pub mod resolver;
pub mod retry;
pub mod rollback;

use std::collections::BTreeMap;
use std::sync::Arc;

use procedo_types::config::EngineConfig;
use procedo_types::execution::{ExecutionResult, TraceEntry, TraceStatus};
use procedo_types::procedure::{Command, ProcedureDefinition};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::expression::{ExpressionService, JexlExpressionService};
use crate::procedure::definition::{collect_expressions, referenced_categories, validate_definition};
use crate::repository::DynProcedureRepository;

pub use context::{Compensation, Counters, ExecutionContext};
pub use error::{EngineError, ExecutionFailure, LimitViolation, RollbackError};
pub use executor::{BoxFuture, CommandExecutor, ExecutorRegistry};
pub use resolver::ExpressionResolver;

/// Category whose steps count against the HTTP call quota.
pub const INTEGRATION_CATEGORY: &str = "integration";

/// Category whose steps count against the notification quota.
pub const NOTIFICATION_CATEGORY: &str = "notification";

// ---------------------------------------------------------------------------
// ExecutionOptions
// ---------------------------------------------------------------------------

/// Per-invocation options for a top-level execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Simulate: leaves return placeholders, sub-procedures are not run.
    pub dry_run: bool,
    /// External cancellation; checked before every step.
    pub cancel: Option<CancellationToken>,
}

impl ExecutionOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The procedure interpreter.
///
/// `Engine` is `Send + Sync` and meant to be shared behind an `Arc` by
/// concurrent executions; all per-run state lives in the
/// [`ExecutionContext`] each invocation owns.
pub struct Engine {
    config: EngineConfig,
    registry: ExecutorRegistry,
    resolver: ExpressionResolver,
    repository: Option<DynProcedureRepository>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &ExpressionResolver {
        &self.resolver
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Look up the published definition for `code` and execute it.
    pub async fn execute(
        &self,
        code: &str,
        input: Value,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let definition = self.load_definition(code).await?;
        self.execute_definition(&definition, input, ExecutionOptions::default())
            .await
    }

    /// Simulate `definition` without side effects in leaf executors.
    pub async fn dry_run(
        &self,
        definition: &ProcedureDefinition,
        input: Value,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        self.execute_definition(definition, input, ExecutionOptions::dry_run())
            .await
    }

    /// Execute an already-loaded definition.
    ///
    /// On failure, registered compensations are unwound before returning; the
    /// returned [`ExecutionFailure`] carries the forward error, any rollback
    /// error, and the trace gathered so far.
    pub async fn execute_definition(
        &self,
        definition: &ProcedureDefinition,
        input: Value,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let span = info_span!(
            "procedure",
            code = %definition.code,
            dry_run = options.dry_run
        );

        async move {
            let started = Instant::now();
            let deadline = started + self.config.execution_timeout();
            let mut ctx = ExecutionContext::new(
                &definition.code,
                input,
                deadline,
                options.dry_run,
                options.cancel.unwrap_or_default(),
            );

            match self.run_commands(&definition.commands, &mut ctx).await {
                Ok(()) => {
                    let result = self.resolve_result(&definition.result, ctx.vars());
                    let (trace, warnings) = ctx.take_report();
                    info!(
                        steps = trace.len(),
                        warnings = warnings.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "procedure completed"
                    );
                    Ok(ExecutionResult {
                        success: true,
                        result,
                        warnings,
                        trace,
                    })
                }
                Err(error) => {
                    warn!(
                        error = %error,
                        compensations = ctx.pending_compensations(),
                        "procedure failed, rolling back"
                    );
                    let rollback_error = self.rollback(&mut ctx).await;
                    let (trace, warnings) = ctx.take_report();
                    Err(ExecutionFailure {
                        error,
                        rollback_error,
                        trace,
                        warnings,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run a command list sequentially against `ctx`.
    ///
    /// This is the recursive entry point used by flow control and the saga
    /// runner; nested lists share the caller's context.
    pub fn run_commands<'a>(
        &'a self,
        commands: &'a [Command],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            for (index, command) in commands.iter().enumerate() {
                self.run_step(command, index, ctx).await?;
            }
            Ok(())
        })
    }

    /// Fetch a published definition, mapping absence to `NotFound`.
    pub async fn load_definition(&self, code: &str) -> Result<ProcedureDefinition, EngineError> {
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| EngineError::failed("no procedure repository configured"))?;
        repository
            .get_published_definition_boxed(code)
            .await?
            .ok_or_else(|| EngineError::NotFound(code.to_string()))
    }

    /// Resolve a result map against final variables. Entries that fail to
    /// resolve become `null`.
    pub fn resolve_result(
        &self,
        result: &BTreeMap<String, String>,
        vars: &Map<String, Value>,
    ) -> BTreeMap<String, Value> {
        result
            .iter()
            .map(|(name, expression)| {
                let value = self.resolver.evaluate(expression, vars).unwrap_or_else(|e| {
                    warn!(output = %name, error = %e, "result entry unresolvable, using null");
                    Value::Null
                });
                (name.clone(), value)
            })
            .collect()
    }

    /// Check a definition against this engine: structure, registered
    /// categories, and that every expression compiles.
    ///
    /// Returns every problem found; an empty list means the definition is
    /// runnable.
    pub fn check_definition(&self, definition: &ProcedureDefinition) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = validate_definition(definition) {
            problems.push(e.to_string());
        }

        let mut categories: Vec<_> = referenced_categories(definition).into_iter().collect();
        categories.sort();
        for category in categories {
            if self.registry.get(&category).is_none() {
                problems.push(format!("no executor registered for category '{category}'"));
            }
        }

        for expression in collect_expressions(definition) {
            if let Err(e) = self.resolver.service().compile(&expression) {
                problems.push(e.to_string());
            }
        }
        problems
    }

    // -----------------------------------------------------------------------
    // Step pipeline
    // -----------------------------------------------------------------------

    async fn run_step(
        &self,
        command: &Command,
        index: usize,
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        let step = command.step_name(index);
        let command_type = command.command_type.as_str();
        let started = Instant::now();

        let executor = match self.executor_for(command) {
            Ok(executor) => executor,
            Err(error) => return Err(fail_fast(ctx, &step, command_type, started, error)),
        };
        let category = executor.category().to_string();

        if !ctx.is_compensating() {
            if let Err(error) = self.preflight(&category, ctx) {
                return Err(fail_fast(ctx, &step, command_type, started, error));
            }
        }

        if let Some(guard) = command.when.as_deref() {
            match self.resolver.evaluate_bool(guard, ctx.vars()) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step = %step, command_type, "guard false, skipping step");
                    ctx.record(TraceEntry::new(
                        &step,
                        command_type,
                        TraceStatus::Skipped,
                        elapsed_ms(started),
                    ));
                    return Ok(());
                }
                Err(error) => return self.settle_failure(command, &step, started, error, ctx),
            }
        }

        count_step(&category, ctx);
        debug!(step = %step, command_type, "executing step");

        match self.execute_with_retry(executor, command, &step, ctx).await {
            Ok(value) => {
                ctx.record(TraceEntry::new(
                    &step,
                    command_type,
                    TraceStatus::Ok,
                    elapsed_ms(started),
                ));
                if let Some(alias) = &command.alias {
                    ctx.set_var(alias.clone(), value);
                }
                if !command.rollback.is_empty() && !ctx.is_compensating() {
                    ctx.push_compensation(Compensation {
                        step: step.clone(),
                        commands: command.rollback.clone(),
                        frame: None,
                    });
                }
                Ok(())
            }
            Err(error) => self.settle_failure(command, &step, started, error, ctx),
        }
    }

    fn executor_for(&self, command: &Command) -> Result<&Arc<dyn CommandExecutor>, EngineError> {
        let (category, _) = command.category_and_verb().ok_or_else(|| {
            EngineError::malformed(format!(
                "command type '{}' must have the form 'category.verb'",
                command.command_type
            ))
        })?;
        self.registry.get(category).ok_or_else(|| {
            EngineError::malformed(format!("unknown command category '{category}'"))
        })
    }

    /// Limits, cancellation, deadline -- in that order.
    fn preflight(&self, category: &str, ctx: &ExecutionContext) -> Result<(), EngineError> {
        let counters = ctx.counters();
        if counters.commands >= self.config.max_commands {
            return Err(LimitViolation::Commands {
                max: self.config.max_commands,
            }
            .into());
        }
        if category == INTEGRATION_CATEGORY && counters.http_calls >= self.config.max_http_calls {
            return Err(LimitViolation::HttpCalls {
                max: self.config.max_http_calls,
            }
            .into());
        }
        if category == NOTIFICATION_CATEGORY
            && counters.notifications >= self.config.max_notifications
        {
            return Err(LimitViolation::Notifications {
                max: self.config.max_notifications,
            }
            .into());
        }
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if ctx.deadline_passed() {
            return Err(LimitViolation::Deadline.into());
        }
        Ok(())
    }

    /// Downgrade an optional step's failure to a warning, or record the
    /// error and abort.
    fn settle_failure(
        &self,
        command: &Command,
        step: &str,
        started: Instant,
        error: EngineError,
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        let command_type = command.command_type.as_str();
        if command.optional && !error.is_fatal() {
            warn!(step, command_type, error = %error, "optional step failed, continuing");
            ctx.record(
                TraceEntry::new(step, command_type, TraceStatus::Warning, elapsed_ms(started))
                    .with_error(error.to_string()),
            );
            ctx.add_warning(format!("step '{step}' failed: {error}"));
            return Ok(());
        }
        Err(fail_fast(ctx, step, command_type, started, error))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("has_repository", &self.repository.is_some())
            .finish()
    }
}

fn fail_fast(
    ctx: &mut ExecutionContext,
    step: &str,
    command_type: &str,
    started: Instant,
    error: EngineError,
) -> EngineError {
    debug!(step, command_type, error = %error, "step failed");
    ctx.record(
        TraceEntry::new(step, command_type, TraceStatus::Error, elapsed_ms(started))
            .with_error(error.to_string()),
    );
    error.in_step(step, command_type)
}

fn count_step(category: &str, ctx: &mut ExecutionContext) {
    let counters = ctx.counters_mut();
    counters.commands += 1;
    match category {
        INTEGRATION_CATEGORY => counters.http_calls += 1,
        NOTIFICATION_CATEGORY => counters.notifications += 1,
        _ => {}
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// EngineBuilder
// ---------------------------------------------------------------------------

/// Collects configuration and collaborators, then freezes them into an
/// [`Engine`].
///
/// `build()` registers the built-in `flow`, `compute` and `check` executors
/// alongside the supplied leaves and fails on duplicate categories.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    expressions: Option<Arc<dyn ExpressionService>>,
    repository: Option<DynProcedureRepository>,
    executors: Vec<Arc<dyn CommandExecutor>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the expression service (defaults to JEXL with the configured
    /// cache capacity).
    pub fn expression_service(mut self, service: Arc<dyn ExpressionService>) -> Self {
        self.expressions = Some(service);
        self
    }

    pub fn repository(mut self, repository: DynProcedureRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executors.push(Arc::new(executor));
        self
    }

    pub fn shared_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(flow::FlowExecutor))?;
        registry.register(Arc::new(compute::ComputeExecutor))?;
        registry.register(Arc::new(check::CheckExecutor))?;
        for executor in self.executors {
            registry.register(executor)?;
        }

        let service = self.expressions.unwrap_or_else(|| {
            Arc::new(JexlExpressionService::new(
                self.config.expression_cache_capacity,
            ))
        });

        info!(
            categories = ?registry.categories(),
            max_commands = self.config.max_commands,
            max_call_depth = self.config.max_call_depth,
            "engine built"
        );

        Ok(Engine {
            config: self.config,
            registry,
            resolver: ExpressionResolver::new(service),
            repository: self.repository,
        })
    }
}
