//! Conversational session data models

use crate::models::workflow::WorkflowContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Role of a conversation entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Single entry of a session's conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A unit of conversational and workflow continuity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_context_snapshot: Option<WorkflowContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

impl Session {
    /// New active session with an empty history
    pub fn new(mode: &str, spec_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            mode: mode.to_string(),
            workflow_name: None,
            workflow_context_snapshot: None,
            current_step: None,
            total_steps: None,
            spec_name,
            started_at: now,
            last_activity: now,
            is_active: true,
            conversation_history: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub(crate) fn clear_workflow(&mut self) {
        self.workflow_name = None;
        self.workflow_context_snapshot = None;
        self.current_step = None;
        self.total_steps = None;
    }
}

/// Workflow linkage recovered from a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWorkflowState {
    pub workflow_name: String,
    pub context_snapshot: Option<WorkflowContext>,
    pub current_step: usize,
    pub total_steps: usize,
}

/// On-disk form of the session store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStoreData {
    #[serde(default)]
    pub sessions: HashMap<String, Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<String>,
}
