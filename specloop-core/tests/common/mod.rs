//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use specloop_core::models::workflow::{
    ApprovalRequest, ProgressEvent, RunOutcome, StepDefinition, StepResult, StepStatus,
    WorkflowContext, WorkflowDefinition,
};
use specloop_core::workflow::{
    ApprovalGateway, StateStore, StepHandler, WorkflowEngine, WorkflowListener, WorkflowRegistry,
};
use specloop_core::ApprovalError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const SCOPE: &str = "workspace";
pub const MODE: &str = "test";
pub const HANDLER: &str = "scripted";

/// What the scripted handler does for one step id
#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Error(&'static str),
    Stop,
    Invalid(&'static str),
    /// Signal `entered`, then wait for `release`
    Block {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// Handler whose result per step id is scripted; records every call
#[derive(Default)]
pub struct ScriptedHandler {
    behaviors: Mutex<HashMap<String, Behavior>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, step_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(step_id.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn behavior(&self, step_id: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(step_id)
            .cloned()
            .unwrap_or(Behavior::Succeed)
    }
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    fn validate(&self, step: &StepDefinition, _context: &WorkflowContext) -> Result<(), String> {
        match self.behavior(&step.id) {
            Behavior::Invalid(reason) => Err(reason.to_string()),
            _ => Ok(()),
        }
    }

    async fn handle(
        &self,
        step: &StepDefinition,
        _context: &mut WorkflowContext,
    ) -> anyhow::Result<StepResult> {
        self.calls.lock().unwrap().push(step.id.clone());
        match self.behavior(&step.id) {
            Behavior::Succeed | Behavior::Invalid(_) => {
                Ok(StepResult::ok().with_data(json!({ "done": step.id })))
            }
            Behavior::Fail(message) => Ok(StepResult::fail(message)),
            Behavior::Error(message) => Err(anyhow::anyhow!(message)),
            Behavior::Stop => Ok(StepResult::handoff("handed off")),
            Behavior::Block { entered, release } => {
                entered.notify_one();
                release.notified().await;
                Ok(StepResult::ok())
            }
        }
    }
}

/// Gateway answering from a queue; answers "Approve" once the queue is empty
#[derive(Default)]
pub struct ScriptedGateway {
    answers: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedGateway {
    pub fn answering(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requested_steps(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.step_id.clone())
            .collect()
    }
}

#[async_trait]
impl ApprovalGateway for ScriptedGateway {
    async fn request(&self, request: &ApprovalRequest) -> Result<String, ApprovalError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| request.approve_option.clone()))
    }
}

/// Listener recording every progress event and outcome
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<ProgressEvent>>,
    pub outcomes: Mutex<Vec<RunOutcome>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<(usize, StepStatus)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| (e.current_step, e.status))
            .collect()
    }

    pub fn last(&self) -> ProgressEvent {
        self.events.lock().unwrap().last().cloned().unwrap()
    }
}

impl WorkflowListener for RecordingListener {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_finished(&self, _session_id: Option<&str>, outcome: &RunOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

/// Requirements (approval) → Design → Tasks
pub fn three_step_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "three-step",
        vec![
            StepDefinition::new("requirements", "Requirements", HANDLER).with_approval(),
            StepDefinition::new("design", "Design", HANDLER),
            StepDefinition::new("tasks", "Tasks", HANDLER),
        ],
    )
}

pub fn registry(
    definition: WorkflowDefinition,
    handler: Arc<ScriptedHandler>,
) -> Arc<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::new();
    registry.register_mode(MODE, definition);
    registry.register_handler(HANDLER, handler);
    Arc::new(registry)
}

pub fn engine(
    definition: WorkflowDefinition,
    handler: Arc<ScriptedHandler>,
    store: Arc<dyn StateStore>,
    gateway: Arc<dyn ApprovalGateway>,
) -> (Arc<WorkflowEngine>, Arc<RecordingListener>) {
    let engine = WorkflowEngine::new(SCOPE, registry(definition, handler), store, gateway);
    let listener = RecordingListener::new();
    engine.add_listener(listener.clone());
    (Arc::new(engine), listener)
}
