//! JEXL-backed [`ExpressionService`].
//!
//! Programs are validated with `jexl_parser` at compile time and cached by
//! source text. Evaluation goes through a `jexl_eval::Evaluator` with the
//! standard transforms pre-registered.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::{CompiledExpression, ExpressionError, ExpressionService, ProgramCache, truthy};

/// JEXL expression service with a bounded compiled-program cache.
pub struct JexlExpressionService {
    cache: ProgramCache,
}

impl JexlExpressionService {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: ProgramCache::new(cache_capacity),
        }
    }

    pub fn cache(&self) -> &ProgramCache {
        &self.cache
    }

    /// Build an evaluator with all standard transforms registered.
    ///
    /// The evaluator's transform table is not `Sync`, so one is built per
    /// evaluation rather than shared between executions.
    fn evaluator() -> jexl_eval::Evaluator<'static> {
        jexl_eval::Evaluator::new()
            // String transforms
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("split", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = s.split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("join", |args: &[Value]| {
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let joined = match args.first() {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(delimiter),
                    _ => String::new(),
                };
                Ok(json!(joined))
            })
            // Boolean transforms
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!truthy(&val)))
            })
            // String search transforms
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            })
            // Length transform (works on strings, arrays, and objects)
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
    }
}

impl Default for JexlExpressionService {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ExpressionService for JexlExpressionService {
    fn compile(&self, text: &str) -> Result<Arc<CompiledExpression>, ExpressionError> {
        self.cache.get_or_compile(text, |source| {
            jexl_parser::Parser::parse(source).map_err(|e| ExpressionError::Compile {
                expression: source.to_string(),
                reason: e.to_string(),
            })?;
            Ok(CompiledExpression::new(source))
        })
    }

    fn evaluate(
        &self,
        program: &CompiledExpression,
        scope: &Map<String, Value>,
    ) -> Result<Value, ExpressionError> {
        Self::evaluator()
            .eval_in_context(program.source(), scope)
            .map_err(|e| ExpressionError::Eval {
                expression: program.source().to_string(),
                reason: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
