//! Engine error taxonomy.
//!
//! Errors fall into four groups:
//! - limit/cancellation violations and malformed commands -- fatal, never
//!   downgraded by `optional`, never retried, never caught by `flow.try`
//! - recoverable leaf/expression/lookup failures
//! - structured [`ProcedureFailure`]s raised on purpose, exposed verbatim to
//!   catch blocks
//! - wrappers that add step or callee context around any of the above

use std::fmt;

use procedo_types::error::{EXECUTION_ERROR_CODE, ProcedureFailure, RepositoryError};
use procedo_types::execution::TraceEntry;
use thiserror::Error;

use crate::expression::ExpressionError;

// ---------------------------------------------------------------------------
// LimitViolation
// ---------------------------------------------------------------------------

/// A global resource quota that would be exceeded by the next step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("command limit of {max} exceeded")]
    Commands { max: u32 },

    #[error("HTTP call limit of {max} exceeded")]
    HttpCalls { max: u32 },

    #[error("notification limit of {max} exceeded")]
    Notifications { max: u32 },

    #[error("call depth {depth} exceeds maximum {max}")]
    CallDepth { depth: usize, max: usize },

    #[error("circular call to '{procedure}' (stack: {stack})")]
    CircularCall { procedure: String, stack: String },

    #[error("execution deadline exceeded")]
    Deadline,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors produced while executing a procedure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("limit exceeded: {0}")]
    LimitExceeded(LimitViolation),

    #[error("execution cancelled")]
    Cancelled,

    /// Unknown category, malformed type, or a missing required field.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// A leaf executor failed.
    #[error("{0}")]
    Failed(String),

    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("procedure '{0}' not found")]
    NotFound(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Structured failure raised by `check.fail`, `check.validate` or a leaf.
    #[error("{0}")]
    Raised(ProcedureFailure),

    #[error("step '{step}' ({command_type}) failed: {source}")]
    Step {
        step: String,
        command_type: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("call to '{procedure}' failed: {source}")]
    Call {
        procedure: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn raised(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised(ProcedureFailure::new(code, message))
    }

    /// Wrap with step context unless the error already carries it.
    ///
    /// Errors coming back from a sub-procedure are already annotated with
    /// the callee and its failing step, so they are left as they are.
    pub fn in_step(self, step: &str, command_type: &str) -> Self {
        match self {
            already @ (Self::Step { .. } | Self::Call { .. }) => already,
            other => Self::Step {
                step: step.to_string(),
                command_type: command_type.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn in_call(self, procedure: &str) -> Self {
        Self::Call {
            procedure: procedure.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any step/call wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            Self::Step { source, .. } | Self::Call { source, .. } => source.root(),
            other => other,
        }
    }

    /// Fatal errors abort regardless of `optional`, retry or try/catch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::LimitExceeded(_) | Self::Cancelled | Self::Malformed(_)
        )
    }

    /// The limit violation at the root, if any.
    pub fn limit_violation(&self) -> Option<&LimitViolation> {
        match self.root() {
            Self::LimitExceeded(violation) => Some(violation),
            _ => None,
        }
    }

    /// The `{code, message}` pair exposed to a catch block.
    ///
    /// Raised failures pass through verbatim; anything else gets
    /// `EXECUTION_ERROR` and its display text.
    pub fn catch_descriptor(&self) -> ProcedureFailure {
        match self.root() {
            Self::Raised(failure) => failure.clone(),
            _ => ProcedureFailure::new(EXECUTION_ERROR_CODE, self.to_string()),
        }
    }
}

impl From<LimitViolation> for EngineError {
    fn from(violation: LimitViolation) -> Self {
        Self::LimitExceeded(violation)
    }
}

impl From<ProcedureFailure> for EngineError {
    fn from(failure: ProcedureFailure) -> Self {
        Self::Raised(failure)
    }
}

// ---------------------------------------------------------------------------
// RollbackError / ExecutionFailure
// ---------------------------------------------------------------------------

/// A compensation that failed while unwinding.
#[derive(Debug, Error)]
#[error("compensation for step '{step}' failed: {source}")]
pub struct RollbackError {
    pub step: String,
    #[source]
    pub source: EngineError,
}

/// The error half of an execution.
///
/// Carries the trace and warnings gathered up to the failure so they remain
/// available for postmortem.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub error: EngineError,
    pub rollback_error: Option<RollbackError>,
    pub trace: Vec<TraceEntry>,
    pub warnings: Vec<String>,
}

impl ExecutionFailure {
    pub fn new(error: EngineError) -> Self {
        Self {
            error,
            rollback_error: None,
            trace: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(rollback) = &self.rollback_error {
            write!(f, "; rollback also failed: {rollback}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<EngineError> for ExecutionFailure {
    fn from(error: EngineError) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_step_wraps_once() {
        let err = EngineError::failed("boom")
            .in_step("inner", "x.y")
            .in_step("outer", "flow.if");
        match &err {
            EngineError::Step { step, .. } => assert_eq!(step, "inner"),
            other => panic!("expected step error, got {other:?}"),
        }
        assert_eq!(err.to_string(), "step 'inner' (x.y) failed: boom");
    }

    #[test]
    fn test_is_fatal_looks_through_wrappers() {
        let err = EngineError::from(LimitViolation::Deadline)
            .in_step("s", "x.y")
            .in_call("child");
        assert!(err.is_fatal());
        assert_eq!(err.limit_violation(), Some(&LimitViolation::Deadline));

        let err = EngineError::failed("leaf").in_step("s", "x.y");
        assert!(!err.is_fatal());
        assert!(EngineError::Cancelled.is_fatal());
        assert!(EngineError::malformed("no category").is_fatal());
    }

    #[test]
    fn test_catch_descriptor_raised_verbatim() {
        let err = EngineError::raised("E1", "boom").in_step("s", "check.fail");
        let descriptor = err.catch_descriptor();
        assert_eq!(descriptor.code, "E1");
        assert_eq!(descriptor.message, "boom");
    }

    #[test]
    fn test_catch_descriptor_other_errors() {
        let err = EngineError::failed("socket closed");
        let descriptor = err.catch_descriptor();
        assert_eq!(descriptor.code, EXECUTION_ERROR_CODE);
        assert_eq!(descriptor.message, "socket closed");
    }

    #[test]
    fn test_execution_failure_display_with_rollback() {
        let mut failure = ExecutionFailure::new(EngineError::failed("forward"));
        assert_eq!(failure.to_string(), "forward");

        failure.rollback_error = Some(RollbackError {
            step: "reserve".to_string(),
            source: EngineError::failed("undo"),
        });
        assert_eq!(
            failure.to_string(),
            "forward; rollback also failed: compensation for step 'reserve' failed: undo"
        );
    }
}
