//! Step handler trait

use crate::models::workflow::{StepDefinition, StepResult, WorkflowContext};
use anyhow::Result;
use async_trait::async_trait;

/// Business logic behind a workflow step
///
/// Handlers run to completion before the engine moves on and are never
/// interrupted. A run resumed after a crash invokes the handler of the
/// persisted step again, so `handle` must tolerate repeated invocation.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Check the step's preconditions before it runs
    ///
    /// An `Err` is reported as a validation failure and ends the run.
    fn validate(&self, _step: &StepDefinition, _context: &WorkflowContext) -> Result<(), String> {
        Ok(())
    }

    /// Execute the step
    ///
    /// # Arguments
    /// * `step` - Definition of the step being executed
    /// * `context` - Run context, shared with later steps
    ///
    /// # Returns
    /// Step outcome; an `Err` is treated like `success = false`
    async fn handle(&self, step: &StepDefinition, context: &mut WorkflowContext)
        -> Result<StepResult>;
}
