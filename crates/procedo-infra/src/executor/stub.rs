//! Categories that are registered but have no backing yet.
//!
//! Registering them keeps `check_definition` quiet for procedures that use
//! them, while any attempt to run one fails with a plain (catchable,
//! retryable) error naming the category.

use procedo_core::Engine;
use procedo_core::engine::executor::{command_verb, unknown_verb};
use procedo_core::engine::{BoxFuture, CommandExecutor, EngineError, ExecutionContext};
use procedo_types::procedure::Command;
use serde_json::Value;

fn not_implemented(command: &Command, verbs: &[&str]) -> EngineError {
    match command_verb(command) {
        Err(e) => e,
        Ok(verb) if !verbs.contains(&verb) => unknown_verb(command),
        Ok(_) => {
            tracing::warn!(command = %command.command_type, "command category not implemented");
            EngineError::failed(format!("'{}' is not implemented", command.command_type))
        }
    }
}

/// `notification.send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationExecutor;

impl CommandExecutor for NotificationExecutor {
    fn category(&self) -> &str {
        "notification"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        _ctx: &'a mut ExecutionContext,
        _engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move { Err(not_implemented(command, &["send"])) })
    }
}

/// `wait.delay` and `wait.until`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitExecutor;

impl CommandExecutor for WaitExecutor {
    fn category(&self) -> &str {
        "wait"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        _ctx: &'a mut ExecutionContext,
        _engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move { Err(not_implemented(command, &["delay", "until"])) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procedo_core::ExecutionOptions;
    use procedo_types::procedure::ProcedureDefinition;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::builder()
            .executor(NotificationExecutor)
            .executor(WaitExecutor)
            .build()
            .unwrap()
    }

    async fn run(command: Command) -> EngineError {
        let def = ProcedureDefinition::new("stub").with_command(command);
        engine()
            .execute_definition(&def, json!({}), ExecutionOptions::default())
            .await
            .unwrap_err()
            .error
    }

    #[tokio::test]
    async fn test_known_verbs_fail_as_not_implemented() {
        let err = run(Command::new("notification.send")).await;
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("'notification.send' is not implemented"));

        let err = run(Command::new("wait.until")).await;
        assert!(err.to_string().contains("'wait.until' is not implemented"));
    }

    #[tokio::test]
    async fn test_unknown_verb_is_malformed() {
        let err = run(Command::new("wait.forever")).await;
        assert!(err.is_fatal());
        assert!(err.to_string().contains("unknown command type 'wait.forever'"));
    }

    #[tokio::test]
    async fn test_optional_stub_becomes_warning() {
        let def = ProcedureDefinition::new("stub")
            .with_command(Command::new("notification.send").optional());
        let result = engine()
            .execute_definition(&def, json!({}), ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
    }
}
