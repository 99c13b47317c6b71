//! Workflow orchestration data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default option offered to approve a step
pub const APPROVE_OPTION: &str = "Approve";
/// Default option offered to reject a step
pub const REJECT_OPTION: &str = "Reject";
/// Default option offered to skip a step
pub const SKIP_OPTION: &str = "Skip";

/// Options shown at an approval gate and the one that lets the run advance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Ordered options offered to the human
    pub options: Vec<String>,
    /// The canonical option that approves the step
    pub approve: String,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            options: vec![
                APPROVE_OPTION.to_string(),
                REJECT_OPTION.to_string(),
                SKIP_OPTION.to_string(),
            ],
            approve: APPROVE_OPTION.to_string(),
        }
    }
}

impl ApprovalPolicy {
    /// Whether an answer from the gateway approves the step
    pub fn is_approval(&self, answer: &str) -> bool {
        answer == self.approve
    }
}

/// Single step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDefinition {
    /// Step identifier (unique within the workflow)
    pub id: String,
    /// Display name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Whether a human has to approve the step before the run advances
    #[serde(default)]
    pub requires_approval: bool,
    /// Key of the step handler in the registry
    pub handler_ref: String,
    /// Approval options, defaults to Approve/Reject/Skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalPolicy>,
    /// Command line for the built-in shell handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl StepDefinition {
    /// Create a step without approval or command
    pub fn new(id: &str, name: &str, handler_ref: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            requires_approval: false,
            handler_ref: handler_ref.to_string(),
            approval: None,
            command: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.requires_approval = true;
        self.approval = Some(policy);
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    /// Effective approval policy for this step
    pub fn approval_policy(&self) -> ApprovalPolicy {
        self.approval.clone().unwrap_or_default()
    }
}

/// Workflow definition - an ordered list of steps bound to a mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new(name: &str, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            steps,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }
}

/// Persisted position of a workflow run
///
/// `current_step` is the index of the step about to run. A value equal to
/// `total_steps` means the run is complete and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunState {
    pub workflow_name: String,
    pub current_step: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl WorkflowRunState {
    /// Fresh run state positioned at the first step
    pub fn new(workflow_name: &str, total_steps: usize) -> Self {
        let now = Utc::now();
        Self {
            workflow_name: workflow_name.to_string(),
            current_step: 0,
            total_steps,
            spec_name: None,
            started_at: now,
            last_updated: now,
            mode: None,
            command: None,
            session_id: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.total_steps
    }

    /// Percentage of steps finished, 100 for an empty workflow
    pub fn progress_percent(&self) -> u8 {
        if self.total_steps == 0 {
            return 100;
        }
        let done = self.current_step.min(self.total_steps);
        ((done * 100) / self.total_steps) as u8
    }
}

/// Ordered string-keyed bag of data passed between steps
///
/// Serializes as a list of `[key, value]` pairs so entry order survives a
/// round trip through formats without ordered maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContextBag {
    entries: Vec<(String, Value)>,
}

impl ContextBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value; replacing keeps the original position
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(existing, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// In-memory context of one workflow run, handed to every step handler
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default)]
    pub data: ContextBag,
}

impl WorkflowContext {
    pub fn new(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            ..Self::default()
        }
    }
}

/// Result returned by a step handler
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub success: bool,
    pub message: Option<String>,
    /// `false` stops the run after this step without marking it failed
    pub should_continue: bool,
    /// Stored in the context bag under the step id
    pub data: Option<Value>,
}

impl StepResult {
    /// Successful step, the run continues
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            should_continue: true,
            data: None,
        }
    }

    /// Failed step
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            should_continue: false,
            data: None,
        }
    }

    /// Successful step that hands control back to the caller
    pub fn handoff(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            should_continue: false,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Status of a single step as shown in progress views
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    WaitingApproval,
    Cancelled,
}

impl StepStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "⏳",
            StepStatus::InProgress => "🔄",
            StepStatus::Completed => "✅",
            StepStatus::Failed => "❌",
            StepStatus::WaitingApproval => "⏸️",
            StepStatus::Cancelled => "🚫",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::WaitingApproval => "waiting-approval",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

/// Point-in-time status report for an in-flight workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub workflow_name: String,
    pub total_steps: usize,
    /// Zero-based index of the step the event is about
    pub current_step: usize,
    pub current_step_name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Question put to the approval gateway before a step may advance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub step_id: String,
    pub step_name: String,
    pub message: String,
    pub options: Vec<String>,
    /// The option that lets the workflow advance
    pub approve_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// Precondition of the step was not met
    Validation(String),
    /// Handler returned `success = false` or an error
    Handler(String),
}

impl StepFailure {
    pub fn message(&self) -> &str {
        match self {
            StepFailure::Validation(m) | StepFailure::Handler(m) => m,
        }
    }
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step finished
    Completed,
    /// A step asked to stop without failing
    Stopped { step_index: usize },
    /// A step failed
    Failed {
        step_index: usize,
        failure: StepFailure,
    },
    /// Approval was not granted or the run was cancelled
    Cancelled { step_index: usize, reason: String },
}

impl RunOutcome {
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::Stopped { .. })
    }
}
