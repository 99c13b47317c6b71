//! Workflow execution engine
//!
//! Drives the steps of one workflow definition at a time for a single scope.
//! Internal state sits behind a std mutex that is never held across an
//! await; the only suspension points are step handlers and the approval
//! wait, and only the approval wait is cancellable.

use crate::error::{PersistenceError, WorkflowError};
use crate::models::workflow::{
    ApprovalRequest, ProgressEvent, RunOutcome, StepDefinition, StepFailure, StepResult,
    StepStatus, WorkflowContext, WorkflowDefinition, WorkflowRunState,
};
use crate::services::logging::log_workflow_event;
use crate::workflow::approval::ApprovalGateway;
use crate::workflow::listener::{WorkflowEvent, WorkflowListener};
use crate::workflow::persistence::StateStore;
use crate::workflow::progress::{
    format_duration, ProgressLogLevel, ProgressReporter, ProgressView, RenderOptions, StepView,
    DEFAULT_LOG_CAPACITY,
};
use crate::workflow::registry::WorkflowRegistry;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters of a fresh run
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub mode: String,
    pub command: Option<String>,
    pub spec_name: Option<String>,
    pub session_id: Option<String>,
    pub user_input: Option<String>,
}

impl StartOptions {
    pub fn new(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_spec(mut self, spec_name: impl Into<String>) -> Self {
        self.spec_name = Some(spec_name.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user_input(mut self, input: impl Into<String>) -> Self {
        self.user_input = Some(input.into());
        self
    }
}

struct ActiveRun {
    run_state: WorkflowRunState,
    definition: Arc<WorkflowDefinition>,
    statuses: Vec<StepStatus>,
    cancel_tx: watch::Sender<bool>,
    cancelled: bool,
}

impl ActiveRun {
    fn view(&self) -> ProgressView {
        let current = self.run_state.current_step;
        ProgressView {
            workflow_name: self.definition.name.clone(),
            steps: step_views(&self.definition, &self.statuses),
            current_step: (current < self.definition.total_steps()).then_some(current),
        }
    }
}

#[derive(Default)]
struct EngineState {
    run: Option<ActiveRun>,
    last_view: Option<ProgressView>,
}

/// What the step loop needs to know about its own run
struct RunHandle {
    definition: Arc<WorkflowDefinition>,
    session_id: Option<String>,
    cancel_rx: watch::Receiver<bool>,
}

impl RunHandle {
    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn event(
        &self,
        index: usize,
        step_name: &str,
        status: StepStatus,
        message: Option<String>,
    ) -> ProgressEvent {
        ProgressEvent {
            workflow_name: self.definition.name.clone(),
            total_steps: self.definition.total_steps(),
            current_step: index,
            current_step_name: step_name.to_string(),
            status,
            message,
            details: None,
            session_id: self.session_id.clone(),
        }
    }
}

/// Workflow engine for one scope (usually a workspace)
pub struct WorkflowEngine {
    scope: String,
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn StateStore>,
    gateway: Arc<dyn ApprovalGateway>,
    reporter: Mutex<ProgressReporter>,
    listeners: RwLock<Vec<Arc<dyn WorkflowListener>>>,
    events: broadcast::Sender<WorkflowEvent>,
    state: Mutex<EngineState>,
}

impl WorkflowEngine {
    pub fn new(
        scope: &str,
        registry: Arc<WorkflowRegistry>,
        store: Arc<dyn StateStore>,
        gateway: Arc<dyn ApprovalGateway>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            scope: scope.to_string(),
            registry,
            store,
            gateway,
            reporter: Mutex::new(ProgressReporter::new(DEFAULT_LOG_CAPACITY)),
            listeners: RwLock::new(Vec::new()),
            events,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Bound the progress log to `capacity` entries
    pub fn with_log_capacity(self, capacity: usize) -> Self {
        *self.lock_reporter() = ProgressReporter::new(capacity);
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn add_listener(&self, listener: Arc<dyn WorkflowListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Stream of every event the engine emits from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Start a fresh run of the workflow bound to `options.mode`
    ///
    /// Returns once the run reaches a terminal outcome. Step failures and
    /// denied approvals are outcomes, not errors.
    pub async fn start(&self, options: StartOptions) -> Result<RunOutcome, WorkflowError> {
        let definition = self
            .registry
            .definition_for_mode(&options.mode)
            .ok_or_else(|| WorkflowError::UnknownMode(options.mode.clone()))?;

        let mut run_state = WorkflowRunState::new(&definition.name, definition.total_steps());
        run_state.spec_name = options.spec_name.clone();
        run_state.mode = Some(options.mode.clone());
        run_state.command = options.command.clone();
        run_state.session_id = options.session_id.clone();

        let handle = {
            let mut state = self.lock_state();
            if let Some(run) = &state.run {
                return Err(WorkflowError::AlreadyRunning(
                    run.run_state.workflow_name.clone(),
                ));
            }
            if !run_state.is_complete() {
                self.store.save(&self.scope, &run_state)?;
            }
            install_run(&mut state, Arc::clone(&definition), run_state)
        };

        {
            let mut reporter = self.lock_reporter();
            reporter.reset();
            reporter.start_tracking();
            reporter.add_log(&definition.name, "Workflow started", ProgressLogLevel::Info);
        }
        tracing::info!(
            workflow = %definition.name,
            mode = %options.mode,
            steps = definition.total_steps(),
            "Starting workflow"
        );
        log_workflow_event("started", &definition.name, Some(&options.mode));

        let context = WorkflowContext {
            mode: options.mode,
            spec_name: options.spec_name,
            command: options.command,
            user_input: options.user_input,
            ..WorkflowContext::default()
        };

        self.run_steps(handle, context, 0).await
    }

    /// Continue the run persisted for this scope
    ///
    /// The step at the saved index runs again from the beginning.
    pub async fn resume(&self) -> Result<RunOutcome, WorkflowError> {
        let (handle, context, start_index) = {
            let mut state = self.lock_state();
            if let Some(run) = &state.run {
                return Err(WorkflowError::AlreadyRunning(
                    run.run_state.workflow_name.clone(),
                ));
            }

            let snapshot = self
                .store
                .load(&self.scope)?
                .ok_or(WorkflowError::NoSavedWorkflow)?;

            let (registered_mode, definition) = self
                .registry
                .definition_by_name(&snapshot.workflow_name)
                .ok_or_else(|| WorkflowError::UnknownWorkflow(snapshot.workflow_name.clone()))?;

            if snapshot.is_complete() {
                self.store.clear(&self.scope)?;
                return Err(WorkflowError::InvalidSnapshot(format!(
                    "step index {} is past the last step of '{}'",
                    snapshot.current_step, snapshot.workflow_name
                )));
            }
            if snapshot.total_steps != definition.total_steps() {
                return Err(WorkflowError::InvalidSnapshot(format!(
                    "snapshot has {} steps but '{}' now defines {}",
                    snapshot.total_steps,
                    definition.name,
                    definition.total_steps()
                )));
            }

            let context = WorkflowContext {
                mode: snapshot.mode.clone().unwrap_or(registered_mode),
                spec_name: snapshot.spec_name.clone(),
                command: snapshot.command.clone(),
                ..WorkflowContext::default()
            };
            let start_index = snapshot.current_step;
            let handle = install_run(&mut state, definition, snapshot);
            (handle, context, start_index)
        };

        let workflow_name = handle.definition.name.clone();
        {
            let mut reporter = self.lock_reporter();
            reporter.reset();
            reporter.start_tracking();
            reporter.add_log(
                &workflow_name,
                &format!("Workflow resumed at step {}", start_index + 1),
                ProgressLogLevel::Info,
            );
        }
        tracing::info!(workflow = %workflow_name, step = start_index, "Resuming workflow");
        log_workflow_event("resumed", &workflow_name, None);

        self.run_steps(handle, context, start_index).await
    }

    /// Cancel the current run and clear the persisted snapshot
    ///
    /// An in-flight run stops at its next cancellation point: immediately if
    /// it is waiting for approval, otherwise once the running handler
    /// returns. With no run in flight, a leftover snapshot is cleared.
    /// Returns whether there was anything to cancel.
    pub fn cancel(&self) -> Result<bool, WorkflowError> {
        let mut state = self.lock_state();
        match state.run.as_mut() {
            Some(run) => {
                if !run.cancelled {
                    run.cancelled = true;
                    let _ = run.cancel_tx.send(true);
                    tracing::info!(workflow = %run.run_state.workflow_name, "Cancelling workflow");
                }
                self.store.clear(&self.scope)?;
                Ok(true)
            }
            None => {
                let saved = self.store.load(&self.scope)?;
                if let Some(snapshot) = saved {
                    self.store.clear(&self.scope)?;
                    tracing::info!(
                        workflow = %snapshot.workflow_name,
                        "Cleared saved workflow snapshot"
                    );
                    log_workflow_event("cancelled", &snapshot.workflow_name, None);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// State of the in-flight run
    pub fn get_state(&self) -> Option<WorkflowRunState> {
        self.lock_state()
            .run
            .as_ref()
            .map(|run| run.run_state.clone())
    }

    /// Whether a run is in flight and not being cancelled
    pub fn is_running(&self) -> bool {
        self.lock_state()
            .run
            .as_ref()
            .map(|run| !run.cancelled)
            .unwrap_or(false)
    }

    /// Percentage of finished steps of the in-flight run, 0 when idle
    pub fn get_progress_percent(&self) -> u8 {
        self.lock_state()
            .run
            .as_ref()
            .map(|run| run.run_state.progress_percent())
            .unwrap_or(0)
    }

    /// Snapshot persisted for this scope
    pub fn saved_state(&self) -> Result<Option<WorkflowRunState>, WorkflowError> {
        Ok(self.store.load(&self.scope)?)
    }

    /// Step statuses of the in-flight run, or of the last finished one
    pub fn progress_view(&self) -> Option<ProgressView> {
        let state = self.lock_state();
        match &state.run {
            Some(run) => Some(run.view()),
            None => state.last_view.clone(),
        }
    }

    pub fn render_progress(&self, options: &RenderOptions) -> Option<String> {
        let view = self.progress_view()?;
        Some(self.lock_reporter().render_progress(&view, options))
    }

    async fn run_steps(
        &self,
        mut handle: RunHandle,
        mut context: WorkflowContext,
        start_index: usize,
    ) -> Result<RunOutcome, WorkflowError> {
        let definition = Arc::clone(&handle.definition);
        let total = definition.total_steps();

        for index in start_index..total {
            let step = &definition.steps[index];

            if handle.is_cancelled() {
                return self.finish_cancelled(&handle, index, step, "Workflow cancelled");
            }

            self.lock_reporter().record_step_start(index);
            self.log(&step.name, "Step started", ProgressLogLevel::Info);
            self.set_status(index, StepStatus::InProgress);
            self.emit_progress(handle.event(index, &step.name, StepStatus::InProgress, None));
            tracing::info!(workflow = %definition.name, step = %step.id, "Running step");

            let outcome = self.invoke_handler(step, &mut context).await;
            self.lock_reporter().record_step_end(index);

            let result = match outcome {
                Ok(result) if result.success => result,
                Ok(result) => {
                    let message = result
                        .message
                        .unwrap_or_else(|| format!("Step '{}' failed", step.name));
                    return self.finish_failed(&handle, index, step, StepFailure::Handler(message));
                }
                Err(failure) => return self.finish_failed(&handle, index, step, failure),
            };

            if let Some(data) = result.data.clone() {
                context.data.insert(step.id.clone(), data);
            }

            if handle.is_cancelled() {
                return self.finish_cancelled(&handle, index, step, "Workflow cancelled");
            }

            if !result.should_continue {
                return self.finish_stopped(&handle, index, step, result);
            }

            if step.requires_approval {
                if let Some(reason) = self.await_approval(&mut handle, index, step).await {
                    return self.finish_cancelled(&handle, index, step, &reason);
                }
            }

            let checkpoint = match self.advance(index) {
                Ok(Some(checkpoint)) => checkpoint,
                Ok(None) => {
                    return self.finish_cancelled(&handle, index, step, "Workflow cancelled")
                }
                Err(e) => return Err(self.abort(&handle, index, step, e)),
            };

            self.log(&step.name, "Step completed", ProgressLogLevel::Info);
            self.emit_progress(handle.event(
                index,
                &step.name,
                StepStatus::Completed,
                result.message.clone(),
            ));
            if !checkpoint.is_complete() {
                self.notify(|listener| listener.on_checkpoint(&checkpoint, &context));
            }
        }

        self.finish_completed(&handle)
    }

    /// Run the step's precondition check and then its handler
    async fn invoke_handler(
        &self,
        step: &StepDefinition,
        context: &mut WorkflowContext,
    ) -> Result<StepResult, StepFailure> {
        let handler = self.registry.handler(&step.handler_ref).ok_or_else(|| {
            StepFailure::Handler(format!("No handler registered for '{}'", step.handler_ref))
        })?;

        handler
            .validate(step, context)
            .map_err(StepFailure::Validation)?;

        handler
            .handle(step, context)
            .await
            .map_err(|e| StepFailure::Handler(format!("{:#}", e)))
    }

    /// Wait for the approval gateway; `Some(reason)` means the run must stop
    async fn await_approval(
        &self,
        handle: &mut RunHandle,
        index: usize,
        step: &StepDefinition,
    ) -> Option<String> {
        let policy = step.approval_policy();
        let request = ApprovalRequest {
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            message: approval_message(step),
            options: policy.options.clone(),
            approve_option: policy.approve.clone(),
            session_id: handle.session_id.clone(),
        };

        self.set_status(index, StepStatus::WaitingApproval);
        self.log(&step.name, "Waiting for approval", ProgressLogLevel::Info);
        self.emit_progress(handle.event(
            index,
            &step.name,
            StepStatus::WaitingApproval,
            Some(request.message.clone()),
        ));
        self.notify(|listener| listener.on_approval_request(&request));
        let _ = self
            .events
            .send(WorkflowEvent::ApprovalRequested(request.clone()));

        let answer = tokio::select! {
            answer = self.gateway.request(&request) => answer,
            _ = wait_for_cancel(&mut handle.cancel_rx) => {
                return Some("Workflow cancelled while waiting for approval".to_string());
            }
        };

        match answer {
            Ok(choice) if policy.is_approval(&choice) => {
                tracing::info!(step = %step.id, "Step approved");
                None
            }
            Ok(choice) => {
                tracing::warn!(step = %step.id, choice = %choice, "Step not approved");
                Some(format!("Step '{}' was not approved ({})", step.name, choice))
            }
            Err(e) => {
                tracing::warn!(step = %step.id, "Approval failed: {}", e);
                Some(format!("Approval for '{}' failed: {}", step.name, e))
            }
        }
    }

    /// Move past step `index` and persist the new position
    ///
    /// Returns `None` when the run was cancelled meanwhile, so a cleared
    /// snapshot is never written back.
    fn advance(&self, index: usize) -> Result<Option<WorkflowRunState>, PersistenceError> {
        let mut state = self.lock_state();
        let Some(run) = state.run.as_mut() else {
            return Ok(None);
        };
        if run.cancelled {
            return Ok(None);
        }

        run.run_state.current_step = index + 1;
        run.run_state.last_updated = Utc::now();
        if let Some(status) = run.statuses.get_mut(index) {
            *status = StepStatus::Completed;
        }
        if !run.run_state.is_complete() {
            self.store.save(&self.scope, &run.run_state)?;
        }
        Ok(Some(run.run_state.clone()))
    }

    fn finish_completed(&self, handle: &RunHandle) -> Result<RunOutcome, WorkflowError> {
        let definition = &handle.definition;
        let elapsed = self.lock_reporter().get_total_elapsed_time();
        let index = definition.total_steps().saturating_sub(1);
        let step_name = definition
            .step(index)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| definition.name.clone());

        let mut event = handle.event(
            index,
            &step_name,
            StepStatus::Completed,
            Some(format!("Workflow '{}' completed", definition.name)),
        );
        event.details = Some(format!("Total time: {}", format_duration(elapsed)));

        tracing::info!(workflow = %definition.name, "Workflow completed");
        self.finish(handle, index, RunOutcome::Completed, event)
    }

    fn finish_stopped(
        &self,
        handle: &RunHandle,
        index: usize,
        step: &StepDefinition,
        result: StepResult,
    ) -> Result<RunOutcome, WorkflowError> {
        let message = result
            .message
            .unwrap_or_else(|| format!("Workflow stopped after '{}'", step.name));
        tracing::info!(
            workflow = %handle.definition.name,
            step = %step.id,
            "Workflow stopped by step"
        );

        let event = handle.event(index, &step.name, StepStatus::Completed, Some(message));
        self.finish(handle, index, RunOutcome::Stopped { step_index: index }, event)
    }

    fn finish_failed(
        &self,
        handle: &RunHandle,
        index: usize,
        step: &StepDefinition,
        failure: StepFailure,
    ) -> Result<RunOutcome, WorkflowError> {
        let kind = match &failure {
            StepFailure::Validation(_) => "validation",
            StepFailure::Handler(_) => "handler",
        };
        tracing::error!(
            workflow = %handle.definition.name,
            step = %step.id,
            kind = kind,
            "Step failed: {}",
            failure.message()
        );

        let mut event = handle.event(
            index,
            &step.name,
            StepStatus::Failed,
            Some(failure.message().to_string()),
        );
        event.details = Some(format!("{} error", kind));
        let outcome = RunOutcome::Failed {
            step_index: index,
            failure,
        };
        self.finish(handle, index, outcome, event)
    }

    fn finish_cancelled(
        &self,
        handle: &RunHandle,
        index: usize,
        step: &StepDefinition,
        reason: &str,
    ) -> Result<RunOutcome, WorkflowError> {
        tracing::info!(workflow = %handle.definition.name, step = %step.id, "{}", reason);

        let event = handle.event(
            index,
            &step.name,
            StepStatus::Cancelled,
            Some(reason.to_string()),
        );
        let outcome = RunOutcome::Cancelled {
            step_index: index,
            reason: reason.to_string(),
        };
        self.finish(handle, index, outcome, event)
    }

    /// Clear the snapshot, drop the run and tell everyone how it ended
    fn finish(
        &self,
        handle: &RunHandle,
        index: usize,
        outcome: RunOutcome,
        event: ProgressEvent,
    ) -> Result<RunOutcome, WorkflowError> {
        let cleared = self.store.clear(&self.scope);

        {
            let mut state = self.lock_state();
            if let Some(mut run) = state.run.take() {
                if let Some(status) = run.statuses.get_mut(index) {
                    *status = event.status;
                }
                let mut view = run.view();
                view.current_step = match outcome {
                    RunOutcome::Completed => None,
                    _ => Some(index),
                };
                state.last_view = Some(view);
            }
        }

        let level = match event.status {
            StepStatus::Failed => ProgressLogLevel::Error,
            StepStatus::Cancelled => ProgressLogLevel::Warning,
            _ => ProgressLogLevel::Info,
        };
        self.log(
            &event.current_step_name,
            event.message.as_deref().unwrap_or(""),
            level,
        );

        let event_type = match &outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped { .. } => "stopped",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Cancelled { .. } => "cancelled",
        };
        log_workflow_event(event_type, &handle.definition.name, event.message.as_deref());

        self.emit_progress(event);
        let session_id = handle.session_id.as_deref();
        self.notify(|listener| listener.on_finished(session_id, &outcome));
        let _ = self.events.send(WorkflowEvent::Finished {
            workflow_name: handle.definition.name.clone(),
            session_id: handle.session_id.clone(),
            outcome: outcome.clone(),
        });

        if let Err(e) = cleared {
            tracing::error!("Failed to clear workflow snapshot: {}", e);
            return Err(e.into());
        }
        Ok(outcome)
    }

    /// Drop the run after a persistence fault; the fault goes to the caller
    fn abort(
        &self,
        handle: &RunHandle,
        index: usize,
        step: &StepDefinition,
        error: PersistenceError,
    ) -> WorkflowError {
        tracing::error!(
            workflow = %handle.definition.name,
            step = %step.id,
            "Failed to persist workflow state: {}",
            error
        );
        {
            let mut state = self.lock_state();
            if let Some(run) = state.run.take() {
                state.last_view = Some(run.view());
            }
        }
        self.emit_progress(handle.event(
            index,
            &step.name,
            StepStatus::Failed,
            Some(format!("Failed to persist workflow state: {}", error)),
        ));
        error.into()
    }

    fn set_status(&self, index: usize, status: StepStatus) {
        let mut state = self.lock_state();
        if let Some(slot) = state
            .run
            .as_mut()
            .and_then(|run| run.statuses.get_mut(index))
        {
            *slot = status;
        }
    }

    fn log(&self, step_name: &str, message: &str, level: ProgressLogLevel) {
        self.lock_reporter().add_log(step_name, message, level);
    }

    fn emit_progress(&self, event: ProgressEvent) {
        self.notify(|listener| listener.on_progress(&event));
        let _ = self.events.send(WorkflowEvent::Progress(event));
    }

    fn notify<F: Fn(&dyn WorkflowListener)>(&self, f: F) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reporter(&self) -> MutexGuard<'_, ProgressReporter> {
        self.reporter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn install_run(
    state: &mut EngineState,
    definition: Arc<WorkflowDefinition>,
    run_state: WorkflowRunState,
) -> RunHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let statuses = (0..definition.total_steps())
        .map(|i| {
            if i < run_state.current_step {
                StepStatus::Completed
            } else {
                StepStatus::Pending
            }
        })
        .collect();
    let session_id = run_state.session_id.clone();

    state.run = Some(ActiveRun {
        run_state,
        definition: Arc::clone(&definition),
        statuses,
        cancel_tx,
        cancelled: false,
    });

    RunHandle {
        definition,
        session_id,
        cancel_rx,
    }
}

fn step_views(definition: &WorkflowDefinition, statuses: &[StepStatus]) -> Vec<StepView> {
    definition
        .steps
        .iter()
        .zip(statuses)
        .map(|(step, status)| StepView {
            name: step.name.clone(),
            description: step.description.clone(),
            status: *status,
        })
        .collect()
}

fn approval_message(step: &StepDefinition) -> String {
    if step.description.is_empty() {
        format!("Review '{}' before continuing", step.name)
    } else {
        format!("Review '{}' before continuing: {}", step.name, step.description)
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::approval::AutoApproveGateway;
    use crate::workflow::handler::StepHandler;
    use crate::workflow::persistence::MemoryStateStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl StepHandler for EchoHandler {
        async fn handle(
            &self,
            step: &StepDefinition,
            context: &mut WorkflowContext,
        ) -> anyhow::Result<StepResult> {
            let seen: Vec<String> = context.data.keys().map(str::to_string).collect();
            Ok(StepResult::ok().with_data(json!({ "step": step.id, "seen": seen })))
        }
    }

    fn engine(definition: WorkflowDefinition) -> WorkflowEngine {
        let mut registry = WorkflowRegistry::new();
        registry.register_mode("test", definition);
        registry.register_handler("echo", Arc::new(EchoHandler));
        WorkflowEngine::new(
            "workspace",
            Arc::new(registry),
            Arc::new(MemoryStateStore::new()),
            Arc::new(AutoApproveGateway),
        )
    }

    #[tokio::test]
    async fn test_zero_steps_complete_immediately() {
        let engine = engine(WorkflowDefinition::new("empty", vec![]));

        let outcome = engine.start(StartOptions::new("test")).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(engine.saved_state().unwrap().is_none());
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_unknown_mode_is_an_error() {
        let engine = engine(WorkflowDefinition::new("empty", vec![]));
        let err = engine.start(StartOptions::new("missing")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownMode(mode) if mode == "missing"));
    }

    #[tokio::test]
    async fn test_handler_data_flows_between_steps() {
        let engine = engine(WorkflowDefinition::new(
            "chain",
            vec![
                StepDefinition::new("a", "A", "echo"),
                StepDefinition::new("b", "B", "echo").with_approval(),
            ],
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));

        struct Checkpoints(Arc<Mutex<Vec<(usize, Vec<String>)>>>);
        impl WorkflowListener for Checkpoints {
            fn on_progress(&self, _event: &ProgressEvent) {}
            fn on_checkpoint(&self, state: &WorkflowRunState, context: &WorkflowContext) {
                let keys = context.data.keys().map(str::to_string).collect();
                self.0.lock().unwrap().push((state.current_step, keys));
            }
        }
        engine.add_listener(Arc::new(Checkpoints(seen.clone())));

        let outcome = engine.start(StartOptions::new("test")).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        // Only the intermediate position is checkpointed; completion is not
        assert_eq!(*seen.lock().unwrap(), vec![(1, vec!["a".to_string()])]);
    }

    #[tokio::test]
    async fn test_progress_view_after_completion() {
        let engine = engine(WorkflowDefinition::new(
            "chain",
            vec![
                StepDefinition::new("a", "A", "echo"),
                StepDefinition::new("b", "B", "echo"),
            ],
        ));
        assert!(engine.progress_view().is_none());

        engine.start(StartOptions::new("test")).await.unwrap();

        let view = engine.progress_view().unwrap();
        assert_eq!(view.current_step, None);
        assert!(view.steps.iter().all(|s| s.status == StepStatus::Completed));
        let rendered = engine.render_progress(&RenderOptions::default()).unwrap();
        assert!(rendered.contains("Progress: 2/2 (100%)"));
    }

    #[tokio::test]
    async fn test_cancel_without_run_clears_saved_snapshot() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .save("workspace", &WorkflowRunState::new("chain", 2))
            .unwrap();
        let engine = WorkflowEngine::new(
            "workspace",
            Arc::new(WorkflowRegistry::new()),
            store.clone(),
            Arc::new(AutoApproveGateway),
        );

        assert!(engine.cancel().unwrap());
        assert!(store.load("workspace").unwrap().is_none());
        assert!(!engine.cancel().unwrap());
    }
}
