//! Expression evaluation service.
//!
//! The engine never interprets expression text itself. It hands marker-prefixed
//! strings, guards and conditions to an [`ExpressionService`], which compiles
//! (and caches) programs and evaluates them against the current variables.
//!
//! - `cache` -- read-mostly compiled-program cache
//! - `jexl` -- JEXL-backed implementation with standard transforms
//!
//! **Security note:** Variable values are always passed as the evaluation
//! scope, NEVER interpolated into expression strings.

pub mod cache;
pub mod jexl;

use std::sync::Arc;

use serde_json::{Map, Value};

pub use cache::ProgramCache;
pub use jexl::JexlExpressionService;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while compiling or evaluating an expression.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpressionError {
    #[error("failed to compile expression '{expression}': {reason}")]
    Compile { expression: String, reason: String },

    #[error("failed to evaluate expression '{expression}': {reason}")]
    Eval { expression: String, reason: String },
}

// ---------------------------------------------------------------------------
// CompiledExpression
// ---------------------------------------------------------------------------

/// A validated, reusable expression program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpression {
    source: String,
}

impl CompiledExpression {
    pub(crate) fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The expression text this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// ExpressionService
// ---------------------------------------------------------------------------

/// External expression-evaluation service.
///
/// Implementations must be safe to share across concurrent executions.
/// `compile` is expected to cache; callers compile on every evaluation and
/// rely on the cache for reuse.
pub trait ExpressionService: Send + Sync {
    /// Compile (or fetch from cache) the program for `text`.
    fn compile(&self, text: &str) -> Result<Arc<CompiledExpression>, ExpressionError>;

    /// Evaluate a compiled program against the given variable scope.
    fn evaluate(
        &self,
        program: &CompiledExpression,
        scope: &Map<String, Value>,
    ) -> Result<Value, ExpressionError>;

    /// Compile and evaluate, returning the raw value.
    fn evaluate_any(&self, text: &str, scope: &Map<String, Value>) -> Result<Value, ExpressionError> {
        let program = self.compile(text)?;
        self.evaluate(&program, scope)
    }

    /// Compile and evaluate, coercing the result with [`truthy`].
    fn evaluate_bool(&self, text: &str, scope: &Map<String, Value>) -> Result<bool, ExpressionError> {
        self.evaluate_any(text, scope).map(|v| truthy(&v))
    }
}

/// Coerce a JSON value to boolean using JavaScript-like truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
