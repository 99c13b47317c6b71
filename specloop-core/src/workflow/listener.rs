//! Observers of workflow runs
//!
//! Listeners are called synchronously, in registration order, after the
//! engine has released its internal locks. Streaming consumers subscribe to
//! [`WorkflowEvent`]s through the engine's broadcast channel instead.

use crate::models::workflow::{
    ApprovalRequest, ProgressEvent, RunOutcome, WorkflowContext, WorkflowRunState,
};

/// Synchronous observer of one engine
pub trait WorkflowListener: Send + Sync {
    /// Every step transition, terminal ones included
    fn on_progress(&self, event: &ProgressEvent);

    /// Emitted right before the approval gateway is called
    fn on_approval_request(&self, _request: &ApprovalRequest) {}

    /// The run advanced and its snapshot was persisted
    fn on_checkpoint(&self, _state: &WorkflowRunState, _context: &WorkflowContext) {}

    /// The run ended; the persisted snapshot is already cleared
    fn on_finished(&self, _session_id: Option<&str>, _outcome: &RunOutcome) {}
}

/// Event published on the engine's broadcast channel
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    Progress(ProgressEvent),
    ApprovalRequested(ApprovalRequest),
    Finished {
        workflow_name: String,
        session_id: Option<String>,
        outcome: RunOutcome,
    },
}
