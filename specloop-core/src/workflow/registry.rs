//! Read-only registry of workflow definitions and step handlers

use crate::models::workflow::{StepDefinition, WorkflowDefinition};
use crate::workflow::handler::StepHandler;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Mode of the built-in requirements → design → tasks workflow
pub const SPEC_MODE: &str = "spec";
/// Mode of the built-in single-step workflow
pub const QUICK_MODE: &str = "quick";

/// Handler references used by the built-in workflows
pub mod handler_refs {
    pub const REQUIREMENTS: &str = "spec:requirements";
    pub const DESIGN: &str = "spec:design";
    pub const TASKS: &str = "spec:tasks";
    pub const QUICK: &str = "quick:execute";
}

/// Built-in spec workflow: every document waits for approval
pub fn spec_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        name: "spec-workflow".to_string(),
        description: Some("Requirements, design and task plan for a feature spec".to_string()),
        steps: vec![
            StepDefinition::new("requirements", "Requirements", handler_refs::REQUIREMENTS)
                .with_description("Capture user stories and acceptance criteria")
                .with_approval(),
            StepDefinition::new("design", "Design", handler_refs::DESIGN)
                .with_description("Describe architecture, components and data models")
                .with_approval(),
            StepDefinition::new("tasks", "Tasks", handler_refs::TASKS)
                .with_description("Break the design into an implementation checklist")
                .with_approval(),
        ],
    }
}

/// Built-in quick workflow: one step that hands off to the caller
pub fn quick_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        name: "quick-workflow".to_string(),
        description: Some("Single step; the assistant conversation does the work".to_string()),
        steps: vec![StepDefinition::new("execute", "Execute", handler_refs::QUICK)
            .with_description("Hand the request to the assistant")],
    }
}

/// Load a workflow definition from a YAML file
pub fn load_definition_file(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workflow YAML {}", path.display()))
}

/// Load every `*.yaml` / `*.yml` definition in a directory, sorted by file name
///
/// Files that fail to parse are skipped with a warning.
pub fn load_definitions_dir(dir: &Path) -> Result<Vec<WorkflowDefinition>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).context("Failed to read workflows directory")? {
        let path = entry?.path();
        if path.is_file()
            && matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("yaml") | Some("yml")
            )
        {
            paths.push(path);
        }
    }
    paths.sort();

    let mut definitions = Vec::new();
    for path in paths {
        match load_definition_file(&path) {
            Ok(def) => definitions.push(def),
            Err(e) => tracing::warn!("Skipping workflow file {}: {:#}", path.display(), e),
        }
    }
    Ok(definitions)
}

/// Registry mapping modes to workflow definitions and handler refs to handlers
///
/// Built once, then shared read-only (usually behind an `Arc`).
#[derive(Default)]
pub struct WorkflowRegistry {
    modes: HashMap<String, Arc<WorkflowDefinition>>,
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `spec` and `quick` modes (handlers not included)
    pub fn with_builtin_modes() -> Self {
        let mut registry = Self::new();
        registry.register_mode(SPEC_MODE, spec_workflow());
        registry.register_mode(QUICK_MODE, quick_workflow());
        registry
    }

    /// Bind a definition to a mode, replacing any previous one
    pub fn register_mode(&mut self, mode: &str, definition: WorkflowDefinition) {
        if let Some(previous) = self.modes.insert(mode.to_string(), Arc::new(definition)) {
            tracing::debug!(
                "Mode '{}' re-registered, replacing '{}'",
                mode,
                previous.name
            );
        }
    }

    /// Bind a definition to the mode named after it
    pub fn register(&mut self, definition: WorkflowDefinition) {
        let mode = definition.name.clone();
        self.register_mode(&mode, definition);
    }

    pub fn register_handler(&mut self, handler_ref: &str, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler_ref.to_string(), handler);
    }

    pub fn definition_for_mode(&self, mode: &str) -> Option<Arc<WorkflowDefinition>> {
        self.modes.get(mode).cloned()
    }

    /// Look a definition up by workflow name, returning its mode as well
    pub fn definition_by_name(&self, name: &str) -> Option<(String, Arc<WorkflowDefinition>)> {
        let mut matches: Vec<_> = self
            .modes
            .iter()
            .filter(|(_, def)| def.name == name)
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches
            .first()
            .map(|(mode, def)| ((*mode).clone(), Arc::clone(def)))
    }

    pub fn mode_for_workflow(&self, name: &str) -> Option<String> {
        self.definition_by_name(name).map(|(mode, _)| mode)
    }

    pub fn handler(&self, handler_ref: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(handler_ref).cloned()
    }

    pub fn has_handler(&self, handler_ref: &str) -> bool {
        self.handlers.contains_key(handler_ref)
    }

    /// Registered modes, sorted
    pub fn modes(&self) -> Vec<String> {
        let mut modes: Vec<_> = self.modes.keys().cloned().collect();
        modes.sort();
        modes
    }
}
