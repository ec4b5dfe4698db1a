//! Turns declarative command fields into concrete values.
//!
//! Strings starting with the `=` marker are expressions evaluated against
//! the current variables; every other value passes through unchanged.
//! Arrays and objects are resolved recursively, element by element.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::error::EngineError;
use crate::expression::ExpressionService;

/// Marker that turns a string value into an expression.
pub const EXPRESSION_MARKER: char = '=';

/// Thin adapter over an [`ExpressionService`].
#[derive(Clone)]
pub struct ExpressionResolver {
    service: Arc<dyn ExpressionService>,
}

impl ExpressionResolver {
    pub fn new(service: Arc<dyn ExpressionService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<dyn ExpressionService> {
        &self.service
    }

    /// Resolve a single declarative value.
    pub fn resolve_value(&self, value: &Value, vars: &Map<String, Value>) -> Result<Value, EngineError> {
        match value {
            Value::String(s) => match s.strip_prefix(EXPRESSION_MARKER) {
                Some(expression) => self.eval_text(expression, vars),
                None => Ok(value.clone()),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, vars))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut resolved = Map::with_capacity(fields.len());
                for (key, field) in fields {
                    resolved.insert(key.clone(), self.resolve_value(field, vars)?);
                }
                Ok(Value::Object(resolved))
            }
            _ => Ok(value.clone()),
        }
    }

    /// Resolve a plain string field: evaluated if marker-prefixed, otherwise
    /// returned as a string value.
    pub fn evaluate_if_marked(&self, text: &str, vars: &Map<String, Value>) -> Result<Value, EngineError> {
        match text.strip_prefix(EXPRESSION_MARKER) {
            Some(expression) => self.eval_text(expression, vars),
            None => Ok(Value::String(text.to_string())),
        }
    }

    /// Resolve every entry of a value map. The first failure aborts the map.
    pub fn resolve_map(
        &self,
        values: &BTreeMap<String, Value>,
        vars: &Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        let mut resolved = Map::with_capacity(values.len());
        for (key, value) in values {
            resolved.insert(key.clone(), self.resolve_value(value, vars)?);
        }
        Ok(resolved)
    }

    /// Evaluate a field that is always an expression (`condition`,
    /// `expression`, result entries). The marker is optional.
    pub fn evaluate(&self, expression: &str, vars: &Map<String, Value>) -> Result<Value, EngineError> {
        let text = expression.strip_prefix(EXPRESSION_MARKER).unwrap_or(expression);
        self.eval_text(text, vars)
    }

    /// Evaluate a boolean field. An empty expression is true.
    pub fn evaluate_bool(&self, expression: &str, vars: &Map<String, Value>) -> Result<bool, EngineError> {
        let text = expression.strip_prefix(EXPRESSION_MARKER).unwrap_or(expression);
        if text.trim().is_empty() {
            return Ok(true);
        }
        Ok(self.service.evaluate_bool(text.trim(), vars)?)
    }

    fn eval_text(&self, text: &str, vars: &Map<String, Value>) -> Result<Value, EngineError> {
        Ok(self.service.evaluate_any(text.trim(), vars)?)
    }
}

impl std::fmt::Debug for ExpressionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionResolver").finish_non_exhaustive()
    }
}
