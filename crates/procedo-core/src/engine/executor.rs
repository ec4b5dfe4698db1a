//! Command executor extension point and the category registry.
//!
//! Each command category (`data`, `integration`, `flow`, ...) is handled by
//! exactly one [`CommandExecutor`]. The registry is built once by the
//! engine builder and is read-only afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use procedo_types::procedure::Command;
use serde_json::Value;

use super::Engine;
use super::context::ExecutionContext;
use super::error::EngineError;

/// Boxed future returned by executors and recursive engine entry points.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes every verb of one command category.
///
/// The `engine` handle gives flow control a way to recurse into the engine
/// (nested command lists, sub-procedure calls) and gives every executor
/// access to the expression resolver. Leaves that don't need it ignore it.
///
/// A leaf surfaces a structured error to `flow.try` by returning
/// [`EngineError::Raised`].
pub trait CommandExecutor: Send + Sync {
    /// Category prefix this executor owns (the part before the dot).
    fn category(&self) -> &str;

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>>;
}

/// The verb part of a command's `category.verb` type.
pub fn command_verb(command: &Command) -> Result<&str, EngineError> {
    command
        .category_and_verb()
        .map(|(_, verb)| verb)
        .ok_or_else(|| {
            EngineError::malformed(format!(
                "command type '{}' must have the form 'category.verb'",
                command.command_type
            ))
        })
}

/// Unwrap a required command field or fail with a malformed-command error.
pub fn required_field<'a, T: ?Sized>(
    value: Option<&'a T>,
    command: &Command,
    field: &str,
) -> Result<&'a T, EngineError> {
    value.ok_or_else(|| {
        EngineError::malformed(format!(
            "'{}' requires '{field}'",
            command.command_type
        ))
    })
}

/// Error for a verb the category's executor does not implement.
pub fn unknown_verb(command: &Command) -> EngineError {
    EngineError::malformed(format!("unknown command type '{}'", command.command_type))
}

// ---------------------------------------------------------------------------
// ExecutorRegistry
// ---------------------------------------------------------------------------

/// Immutable category -> executor map.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn CommandExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its category. Rejects duplicates.
    pub fn register(&mut self, executor: Arc<dyn CommandExecutor>) -> Result<(), EngineError> {
        let category = executor.category().to_string();
        if category.is_empty() || category.contains('.') {
            return Err(EngineError::malformed(format!(
                "invalid executor category '{category}'"
            )));
        }
        if self.executors.contains_key(&category) {
            return Err(EngineError::malformed(format!(
                "duplicate executor for category '{category}'"
            )));
        }
        self.executors.insert(category, executor);
        Ok(())
    }

    pub fn get(&self, category: &str) -> Option<&Arc<dyn CommandExecutor>> {
        self.executors.get(category)
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        categories.sort_unstable();
        categories
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("categories", &self.categories())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl CommandExecutor for Named {
        fn category(&self) -> &str {
            self.0
        }

        fn execute<'a>(
            &'a self,
            _command: &'a Command,
            _ctx: &'a mut ExecutionContext,
            _engine: &'a Engine,
        ) -> BoxFuture<'a, Result<Value, EngineError>> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(Named("data"))).unwrap();
        registry.register(Arc::new(Named("integration"))).unwrap();
        assert!(registry.get("data").is_some());
        assert!(registry.get("wait").is_none());
        assert_eq!(registry.categories(), ["data", "integration"]);
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(Named("data"))).unwrap();
        let err = registry.register(Arc::new(Named("data"))).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_category_rejected() {
        let mut registry = ExecutorRegistry::new();
        assert!(registry.register(Arc::new(Named("a.b"))).is_err());
        assert!(registry.register(Arc::new(Named(""))).is_err());
    }
}
