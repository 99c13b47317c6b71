//! Step handlers behind the built-in `spec` and `quick` workflows

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use specloop_core::models::workflow::{StepDefinition, StepResult, WorkflowContext};
use specloop_core::tasks::{parse_tasks, summarize};
use specloop_core::workflow::StepHandler;
use std::path::{Path, PathBuf};

/// Spec documents live under `<workspace>/.specloop/specs/<spec>/`
pub const SPECS_DIR: &str = ".specloop/specs";

/// One of the three documents a spec is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDocument {
    Requirements,
    Design,
    Tasks,
}

impl SpecDocument {
    pub fn file_name(&self) -> &'static str {
        match self {
            SpecDocument::Requirements => "requirements.md",
            SpecDocument::Design => "design.md",
            SpecDocument::Tasks => "tasks.md",
        }
    }

    /// Document that has to exist before this one is drafted
    pub fn prerequisite(&self) -> Option<SpecDocument> {
        match self {
            SpecDocument::Requirements => None,
            SpecDocument::Design => Some(SpecDocument::Requirements),
            SpecDocument::Tasks => Some(SpecDocument::Design),
        }
    }

    fn template(&self, spec_name: &str, request: Option<&str>) -> String {
        let request = request.unwrap_or("_Describe the feature here._");
        match self {
            SpecDocument::Requirements => format!(
                "# Requirements: {spec_name}\n\n## Introduction\n\n{request}\n\n\
                 ## Requirements\n\n### Requirement 1\n\n\
                 **User Story:** As a ..., I want ..., so that ...\n\n\
                 #### Acceptance Criteria\n\n1. WHEN ... THEN the system SHALL ...\n"
            ),
            SpecDocument::Design => format!(
                "# Design: {spec_name}\n\n## Overview\n\n{request}\n\n\
                 ## Architecture\n\n## Components and Interfaces\n\n\
                 ## Data Models\n\n## Error Handling\n\n## Testing Strategy\n"
            ),
            SpecDocument::Tasks => format!(
                "# Implementation Plan: {spec_name}\n\n\
                 - [ ] 1. Set up the project structure\n\
                 - [ ] 2. Implement the core behavior\n  - _Requirements: 1_\n\
                 - [ ] 3. Write tests\n"
            ),
        }
    }
}

/// Drafts one spec document from a template, keeping any existing file
///
/// Re-running the step (for example after a resume) reuses the document the
/// user has been editing instead of overwriting it.
pub struct SpecDocumentHandler {
    workspace: PathBuf,
    document: SpecDocument,
}

impl SpecDocumentHandler {
    pub fn new(workspace: &Path, document: SpecDocument) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            document,
        }
    }

    fn spec_dir(&self, spec_name: &str) -> PathBuf {
        self.workspace.join(SPECS_DIR).join(spec_name)
    }
}

fn spec_name(context: &WorkflowContext) -> Option<&str> {
    context
        .spec_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl StepHandler for SpecDocumentHandler {
    fn validate(&self, step: &StepDefinition, context: &WorkflowContext) -> Result<(), String> {
        let spec_name = spec_name(context)
            .ok_or_else(|| format!("Step '{}' needs a spec name (--spec)", step.name))?;
        if spec_name.contains(['/', '\\']) || !spec_name.chars().any(char::is_alphanumeric) {
            return Err(format!("Invalid spec name '{}'", spec_name));
        }

        if let Some(prerequisite) = self.document.prerequisite() {
            let path = self.spec_dir(spec_name).join(prerequisite.file_name());
            if !path.exists() {
                return Err(format!(
                    "{} must exist before the {} step",
                    path.display(),
                    step.name
                ));
            }
        }
        Ok(())
    }

    async fn handle(
        &self,
        _step: &StepDefinition,
        context: &mut WorkflowContext,
    ) -> Result<StepResult> {
        let spec_name = spec_name(context).context("Spec name missing")?.to_string();
        let dir = self.spec_dir(&spec_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(self.document.file_name());
        let created = !path.exists();
        if created {
            let content = self
                .document
                .template(&spec_name, context.user_input.as_deref());
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let mut data = json!({
            "path": path.display().to_string(),
            "created": created,
        });
        if self.document == SpecDocument::Tasks {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            data["tasks"] = serde_json::to_value(summarize(&parse_tasks(&content)))?;
        }

        let verb = if created { "Drafted" } else { "Using existing" };
        Ok(StepResult::ok()
            .with_message(format!("{} {}", verb, path.display()))
            .with_data(data))
    }
}

/// Hands the request over to the assistant conversation and stops the run
pub struct QuickRequestHandler;

#[async_trait]
impl StepHandler for QuickRequestHandler {
    fn validate(&self, _step: &StepDefinition, context: &WorkflowContext) -> Result<(), String> {
        if context.user_input.is_none() && context.command.is_none() {
            return Err("Quick mode needs a request (--input)".to_string());
        }
        Ok(())
    }

    async fn handle(
        &self,
        _step: &StepDefinition,
        context: &mut WorkflowContext,
    ) -> Result<StepResult> {
        let request = context
            .user_input
            .clone()
            .or_else(|| context.command.clone())
            .unwrap_or_default();
        Ok(StepResult::handoff(format!("Handed off: {}", request))
            .with_data(json!({ "request": request })))
    }
}
