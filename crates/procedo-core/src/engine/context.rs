//! Execution context threaded through one procedure execution.
//!
//! The context is the only mutable state of a run: variables, call stack,
//! rollback stack, resource counters, deadline, trace and warnings. A nested
//! procedure call runs in a derived child context that shares the counters,
//! deadline and cancellation token of its parent but starts with fresh
//! variables.

use procedo_types::execution::TraceEntry;
use procedo_types::procedure::Command;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reserved variable holding the procedure input.
pub const INPUT_VAR: &str = "input";

/// Reserved variable holding the execution start time (RFC 3339).
pub const NOW_VAR: &str = "now";

/// Reserved variable holding `{code, message}` inside a catch block.
pub const ERROR_VAR: &str = "error";

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Monotonic resource counters for one execution tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub commands: u32,
    pub http_calls: u32,
    pub notifications: u32,
}

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

/// A registered rollback: commands to re-run through the engine on failure.
#[derive(Debug, Clone)]
pub struct Compensation {
    /// Step that registered this compensation.
    pub step: String,
    pub commands: Vec<Command>,
    /// Variables to evaluate against instead of the live ones. Set when the
    /// compensation was lifted out of a finished sub-procedure.
    pub frame: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable scope for one execution (or one nested call within it).
#[derive(Debug)]
pub struct ExecutionContext {
    vars: Map<String, Value>,
    call_stack: Vec<String>,
    rollback_stack: Vec<Compensation>,
    counters: Counters,
    deadline: Instant,
    dry_run: bool,
    cancel: CancellationToken,
    trace: Vec<TraceEntry>,
    warnings: Vec<String>,
    compensating: bool,
}

impl ExecutionContext {
    /// Create the context for a top-level execution of `code`.
    pub fn new(
        code: &str,
        input: Value,
        deadline: Instant,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            vars: seed_vars(input),
            call_stack: vec![code.to_string()],
            rollback_stack: Vec::new(),
            counters: Counters::default(),
            deadline,
            dry_run,
            cancel,
            trace: Vec::new(),
            warnings: Vec::new(),
            compensating: false,
        }
    }

    /// Derive the context for a nested call to `code`.
    ///
    /// Counters, deadline, dry-run flag and cancellation carry over; the
    /// variables are fresh and the call stack is extended by `code`.
    pub fn child(&self, code: &str, input: Value) -> Self {
        let mut call_stack = self.call_stack.clone();
        call_stack.push(code.to_string());
        Self {
            vars: seed_vars(input),
            call_stack,
            rollback_stack: Vec::new(),
            counters: self.counters,
            deadline: self.deadline,
            dry_run: self.dry_run,
            cancel: self.cancel.clone(),
            trace: Vec::new(),
            warnings: Vec::new(),
            compensating: self.compensating,
        }
    }

    /// Fold a finished child's counters, trace and warnings back in.
    pub fn absorb(&mut self, child: &mut ExecutionContext) {
        self.counters = child.counters;
        self.trace.append(&mut child.trace);
        self.warnings.append(&mut child.warnings);
    }

    // -- Variables ----------------------------------------------------------

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn remove_var(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Swap the whole variable map, returning the previous one.
    pub fn replace_vars(&mut self, vars: Map<String, Value>) -> Map<String, Value> {
        std::mem::replace(&mut self.vars, vars)
    }

    pub fn into_vars(self) -> Map<String, Value> {
        self.vars
    }

    // -- Call stack ---------------------------------------------------------

    pub fn call_stack(&self) -> &[String] {
        &self.call_stack
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn is_on_stack(&self, code: &str) -> bool {
        self.call_stack.iter().any(|c| c == code)
    }

    /// Code of the procedure currently executing.
    pub fn current_procedure(&self) -> &str {
        self.call_stack.last().map(String::as_str).unwrap_or("")
    }

    // -- Rollback stack -----------------------------------------------------

    pub fn push_compensation(&mut self, compensation: Compensation) {
        self.rollback_stack.push(compensation);
    }

    pub fn pop_compensation(&mut self) -> Option<Compensation> {
        self.rollback_stack.pop()
    }

    /// Drain all registered compensations in registration order.
    pub fn take_compensations(&mut self) -> Vec<Compensation> {
        std::mem::take(&mut self.rollback_stack)
    }

    pub fn pending_compensations(&self) -> usize {
        self.rollback_stack.len()
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    pub(crate) fn set_compensating(&mut self, compensating: bool) {
        self.compensating = compensating;
    }

    // -- Counters, deadline, cancellation -----------------------------------

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // -- Trace and warnings -------------------------------------------------

    pub fn record(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Move the trace and warnings out, leaving both empty.
    pub fn take_report(&mut self) -> (Vec<TraceEntry>, Vec<String>) {
        (
            std::mem::take(&mut self.trace),
            std::mem::take(&mut self.warnings),
        )
    }
}

fn seed_vars(input: Value) -> Map<String, Value> {
    let mut vars = Map::new();
    vars.insert(INPUT_VAR.to_string(), input);
    vars.insert(
        NOW_VAR.to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    vars
}
