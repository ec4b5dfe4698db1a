//! Saga runner: unwinds registered compensations after a failure.
//!
//! Compensations run strictly in reverse registration order and each runs
//! at most once (the stack is drained as it goes). A failing compensation is
//! logged and the runner moves on; the first failure is reported back
//! alongside the forward error.
//!
//! While unwinding, the context is flagged as compensating: pre-step limit,
//! cancellation and deadline checks are suspended, so compensations still run
//! after a limit or deadline abort.

use tracing::{error, info};

use super::context::ExecutionContext;
use super::error::RollbackError;
use super::Engine;

impl Engine {
    /// Drain and run every pending compensation in `ctx`, newest first.
    pub async fn rollback(&self, ctx: &mut ExecutionContext) -> Option<RollbackError> {
        if ctx.pending_compensations() == 0 {
            return None;
        }

        let was_compensating = ctx.is_compensating();
        ctx.set_compensating(true);

        let mut first_error: Option<RollbackError> = None;
        while let Some(compensation) = ctx.pop_compensation() {
            info!(step = %compensation.step, "running compensation");

            let saved_vars = compensation.frame.map(|frame| ctx.replace_vars(frame));
            let outcome = self.run_commands(&compensation.commands, ctx).await;
            if let Some(vars) = saved_vars {
                ctx.replace_vars(vars);
            }

            if let Err(e) = outcome {
                error!(step = %compensation.step, error = %e, "compensation failed");
                if first_error.is_none() {
                    first_error = Some(RollbackError {
                        step: compensation.step,
                        source: e,
                    });
                }
            }
        }

        ctx.set_compensating(was_compensating);
        first_error
    }
}
