//! Bounded retry with backoff under the execution deadline.
//!
//! A step with `retry.attempts > 1` is re-dispatched until it succeeds or the
//! attempts run out. Each failed attempt is recorded as a `retry` trace
//! entry. Before sleeping, the next delay is checked against the deadline:
//! if sleeping would overshoot it, the step aborts with a deadline error
//! instead of waiting. Fatal errors are never retried.

use std::sync::Arc;
use std::time::Duration;

use procedo_types::execution::{TraceEntry, TraceStatus};
use procedo_types::procedure::Command;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use super::context::ExecutionContext;
use super::error::{EngineError, LimitViolation};
use super::executor::CommandExecutor;
use super::Engine;

impl Engine {
    /// Dispatch `command`, retrying per its policy.
    pub(crate) async fn execute_with_retry(
        &self,
        executor: &Arc<dyn CommandExecutor>,
        command: &Command,
        step: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let policy = match command.retry {
            Some(policy) if policy.attempts > 1 => policy,
            _ => return executor.execute(command, ctx, self).await,
        };

        let backoff = policy.effective_backoff();
        let mut delay = Duration::from_millis(policy.delay_ms);
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let error = match executor.execute(command, ctx, self).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if error.is_fatal() || attempt >= policy.attempts {
                return Err(error);
            }

            ctx.record(
                TraceEntry::new(
                    step,
                    &command.command_type,
                    TraceStatus::Retry,
                    started.elapsed().as_millis() as u64,
                )
                .with_error(error.to_string()),
            );
            warn!(
                step,
                attempt,
                max_attempts = policy.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "step failed, retrying"
            );

            let compensating = ctx.is_compensating();
            // An unrepresentable wake time fails even while compensating.
            let overshoots = match Instant::now().checked_add(delay) {
                Some(wake) => !compensating && wake > ctx.deadline(),
                None => true,
            };
            if overshoots {
                return Err(LimitViolation::Deadline.into());
            }

            let cancel = ctx.cancellation_token().clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled(), if !compensating => {
                    return Err(EngineError::Cancelled);
                }
            }

            delay = next_delay(delay, backoff);
            attempt += 1;
        }
    }
}

/// Grow `delay` by `backoff`, saturating at `Duration::MAX`.
fn next_delay(delay: Duration, backoff: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * backoff).unwrap_or(Duration::MAX)
}
