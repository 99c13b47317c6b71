//! Keeps sessions in step with the workflow runs linked to them

use crate::models::session::{MessageRole, SessionWorkflowState};
use crate::models::workflow::{
    ApprovalRequest, ProgressEvent, RunOutcome, StepStatus, WorkflowContext, WorkflowRunState,
};
use crate::session::store::{SessionStore, SharedSessionStore};
use crate::workflow::listener::WorkflowListener;
use std::sync::{MutexGuard, PoisonError};

/// Workflow listener that writes run progress into the linked session
///
/// Events without a session id are ignored.
pub struct SessionProgressListener {
    store: SharedSessionStore,
}

impl SessionProgressListener {
    pub fn new(store: SharedSessionStore) -> Self {
        Self { store }
    }

    fn lock(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkflowListener for SessionProgressListener {
    fn on_progress(&self, event: &ProgressEvent) {
        let Some(session_id) = &event.session_id else {
            return;
        };

        let mut store = self.lock();
        store.update_session_workflow(
            session_id,
            SessionWorkflowState {
                workflow_name: event.workflow_name.clone(),
                context_snapshot: None,
                current_step: event.current_step,
                total_steps: event.total_steps,
            },
        );

        if event.status == StepStatus::Failed {
            let line = format!(
                "{} {} failed: {}",
                event.status.icon(),
                event.current_step_name,
                event.message.as_deref().unwrap_or("no details")
            );
            store.add_message(session_id, MessageRole::System, &line);
        }
    }

    fn on_approval_request(&self, request: &ApprovalRequest) {
        let Some(session_id) = &request.session_id else {
            return;
        };
        let line = format!(
            "{} {} [{}]",
            StepStatus::WaitingApproval.icon(),
            request.message,
            request.options.join(" / ")
        );
        self.lock()
            .add_message(session_id, MessageRole::System, &line);
    }

    fn on_checkpoint(&self, state: &WorkflowRunState, context: &WorkflowContext) {
        let Some(session_id) = &state.session_id else {
            return;
        };
        self.lock().update_session_workflow(
            session_id,
            SessionWorkflowState {
                workflow_name: state.workflow_name.clone(),
                context_snapshot: Some(context.clone()),
                current_step: state.current_step,
                total_steps: state.total_steps,
            },
        );
    }

    fn on_finished(&self, session_id: Option<&str>, outcome: &RunOutcome) {
        let Some(session_id) = session_id else {
            return;
        };

        let mut store = self.lock();
        match outcome {
            RunOutcome::Completed => {
                store.add_message(
                    session_id,
                    MessageRole::System,
                    &format!("{} Workflow completed", StepStatus::Completed.icon()),
                );
                store.complete_session(session_id);
            }
            RunOutcome::Stopped { .. } | RunOutcome::Failed { .. } => {
                store.clear_session_workflow(session_id);
            }
            RunOutcome::Cancelled { reason, .. } => {
                store.add_message(
                    session_id,
                    MessageRole::System,
                    &format!("{} {}", StepStatus::Cancelled.icon(), reason),
                );
                store.clear_session_workflow(session_id);
            }
        }
    }
}
