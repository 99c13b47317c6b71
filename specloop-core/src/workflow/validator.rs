//! Workflow definition validation

use crate::models::workflow::{ApprovalPolicy, WorkflowDefinition};
use crate::workflow::registry::WorkflowRegistry;
use crate::workflow::shell_handler::SHELL_HANDLER_REF;
use std::collections::HashSet;

/// Single validation problem, located by field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: String, message: String) {
        self.errors.push(ValidationError { field, message });
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Workflow validator
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate an approval policy
    /// - at least one option
    /// - no duplicate options
    /// - the approve value is one of the options
    pub fn validate_approval_policy(policy: &ApprovalPolicy) -> ValidationResult {
        let mut result = ValidationResult::new();

        if policy.options.is_empty() {
            result.add_error(
                "options".to_string(),
                "Approval policy must offer at least one option".to_string(),
            );
        }

        let mut seen = HashSet::new();
        for option in &policy.options {
            if !seen.insert(option.as_str()) {
                result.add_error(
                    "options".to_string(),
                    format!("Option '{}' is offered twice", option),
                );
            }
        }

        if !policy.options.contains(&policy.approve) {
            result.add_error(
                "approve".to_string(),
                format!(
                    "Approve option '{}' is not one of the offered options",
                    policy.approve
                ),
            );
        }

        if policy.options.len() == 1 {
            result.add_warning(
                "Approval policy offers a single option; the gate can never stop the run"
                    .to_string(),
            );
        }

        result
    }

    /// Validate workflow definition
    pub fn validate_workflow(workflow: &WorkflowDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if workflow.name.trim().is_empty() {
            result.add_error(
                "name".to_string(),
                "Workflow name cannot be empty".to_string(),
            );
        }

        if workflow.steps.is_empty() {
            result.add_warning(format!(
                "Workflow '{}' has no steps and completes immediately",
                workflow.name
            ));
        }

        let mut seen_ids = HashSet::new();
        for (index, step) in workflow.steps.iter().enumerate() {
            let field = format!("steps[{}]", index);

            if step.id.trim().is_empty() {
                result.add_error(format!("{}.id", field), "Step id cannot be empty".to_string());
            } else if !seen_ids.insert(step.id.as_str()) {
                result.add_error(
                    format!("{}.id", field),
                    format!("Duplicate step id '{}'", step.id),
                );
            }

            if step.handler_ref.trim().is_empty() {
                result.add_error(
                    format!("{}.handler_ref", field),
                    format!("Step '{}' has no handler_ref", step.id),
                );
            }

            if let Some(policy) = &step.approval {
                let policy_validation = Self::validate_approval_policy(policy);
                for error in policy_validation.errors {
                    result.add_error(format!("{}.approval.{}", field, error.field), error.message);
                }
                for warning in policy_validation.warnings {
                    result.add_warning(format!("Step '{}': {}", step.id, warning));
                }
                if !step.requires_approval {
                    result.add_warning(format!(
                        "Step '{}' defines approval options but requires_approval is false",
                        step.id
                    ));
                }
            }

            if step.handler_ref == SHELL_HANDLER_REF && step.command.is_none() {
                result.add_warning(format!(
                    "Shell step '{}' has no command and will fail validation when run",
                    step.id
                ));
            }
        }

        result
    }

    /// Validate a workflow and check that every handler ref is registered
    pub fn validate_with_registry(
        workflow: &WorkflowDefinition,
        registry: &WorkflowRegistry,
    ) -> ValidationResult {
        let mut result = Self::validate_workflow(workflow);

        for (index, step) in workflow.steps.iter().enumerate() {
            if !step.handler_ref.is_empty() && !registry.has_handler(&step.handler_ref) {
                result.add_error(
                    format!("steps[{}].handler_ref", index),
                    format!("No handler registered for '{}'", step.handler_ref),
                );
            }
        }

        result
    }
}
