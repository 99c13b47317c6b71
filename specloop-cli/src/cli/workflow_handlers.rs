//! Workflow command handlers

use super::approval::TerminalApprovalGateway;
use super::context::AppContext;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use specloop_core::models::session::MessageRole;
use specloop_core::models::workflow::{
    ProgressEvent, RunOutcome, StepStatus, WorkflowDefinition, WorkflowRunState,
};
use specloop_core::session::{SessionProgressListener, SessionStore, SharedSessionStore};
use specloop_core::workflow::{
    load_definition_file, ApprovalGateway, AutoApproveGateway, ProgressReporter, ProgressView,
    RenderOptions, StartOptions, StepView, WorkflowEngine, WorkflowListener, WorkflowValidator,
};
use specloop_core::WorkflowError;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, MutexGuard, PoisonError};

/// Exit code of a run interrupted with Ctrl+C
const EXIT_INTERRUPTED: i32 = 130;

/// Prints each progress event as one line
struct ConsoleProgressListener;

impl WorkflowListener for ConsoleProgressListener {
    fn on_progress(&self, event: &ProgressEvent) {
        println!("{}", progress_line(event));
        if let Some(details) = &event.details {
            println!("   {}", details);
        }
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    let mut line = format!(
        "{} [{}/{}] {}",
        event.status.icon(),
        event.current_step + 1,
        event.total_steps,
        event.current_step_name
    );
    if let Some(message) = &event.message {
        line.push_str(": ");
        line.push_str(message);
    }
    line
}

fn lock_sessions(sessions: &SharedSessionStore) -> MutexGuard<'_, SessionStore> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

fn gateway(auto_approve: bool) -> Arc<dyn ApprovalGateway> {
    if auto_approve {
        Arc::new(AutoApproveGateway)
    } else {
        Arc::new(TerminalApprovalGateway)
    }
}

fn attach_listeners(engine: &WorkflowEngine, sessions: &SharedSessionStore, json: bool) {
    engine.add_listener(Arc::new(SessionProgressListener::new(sessions.clone())));
    if !json {
        engine.add_listener(Arc::new(ConsoleProgressListener));
    }
}

/// Drive a run to its end; Ctrl+C cancels it and waits for the engine to stop
async fn run_until_interrupted<F>(engine: &WorkflowEngine, run: F) -> Result<(RunOutcome, bool)>
where
    F: Future<Output = Result<RunOutcome, WorkflowError>>,
{
    tokio::pin!(run);
    let mut interrupted = false;
    loop {
        tokio::select! {
            outcome = &mut run => {
                let outcome = outcome.context("Workflow run failed")?;
                return Ok((outcome, interrupted));
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl+C")?;
                interrupted = true;
                eprintln!();
                eprintln!("🛑 Cancelling workflow...");
                engine.cancel().context("Failed to cancel workflow")?;
            }
        }
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Stopped { .. } => "stopped",
        RunOutcome::Failed { .. } => "failed",
        RunOutcome::Cancelled { .. } => "cancelled",
    }
}

fn exit_code(outcome: &RunOutcome, interrupted: bool) -> i32 {
    if interrupted {
        EXIT_INTERRUPTED
    } else if outcome.is_terminal_success() {
        0
    } else {
        1
    }
}

fn report_outcome(
    engine: &WorkflowEngine,
    outcome: &RunOutcome,
    session_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let view = engine.progress_view();
    let workflow_name = view.as_ref().map(|v| v.workflow_name.clone());

    if json {
        let mut output = json!({
            "workflow": workflow_name,
            "outcome": outcome_label(outcome),
            "sessionId": session_id,
        });
        match outcome {
            RunOutcome::Completed => {}
            RunOutcome::Stopped { step_index } => {
                output["stepIndex"] = json!(step_index);
            }
            RunOutcome::Failed {
                step_index,
                failure,
            } => {
                output["stepIndex"] = json!(step_index);
                output["message"] = json!(failure.message());
            }
            RunOutcome::Cancelled { step_index, reason } => {
                output["stepIndex"] = json!(step_index);
                output["message"] = json!(reason);
            }
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    if let Some(rendered) = engine.render_progress(&RenderOptions::default()) {
        println!("{}", rendered);
    }
    let name = workflow_name.unwrap_or_default();
    match outcome {
        RunOutcome::Completed => println!("✅ Workflow '{}' completed", name),
        RunOutcome::Stopped { step_index } => {
            println!("✅ Workflow '{}' handed off at step {}", name, step_index + 1)
        }
        RunOutcome::Failed {
            step_index,
            failure,
        } => {
            println!("❌ Step {} failed: {}", step_index + 1, failure.message());
            println!("   Fix the problem and start the workflow again");
        }
        RunOutcome::Cancelled { step_index, reason } => {
            println!("🚫 Stopped at step {}: {}", step_index + 1, reason)
        }
    }
    Ok(())
}

/// Handle the 'start' command
pub async fn handle_start(
    ctx: &AppContext,
    mode: String,
    spec: Option<String>,
    command: Option<String>,
    input: Option<String>,
    auto_approve: bool,
    json: bool,
) -> Result<i32> {
    let engine = ctx.engine(gateway(auto_approve))?;
    if engine.registry().definition_for_mode(&mode).is_none() {
        return Err(anyhow!(
            "Unknown mode '{}'. Use 'specloop modes' to see available modes.",
            mode
        ));
    }

    if let Some(saved) = engine.saved_state()? {
        if !json {
            println!(
                "⚠️  Replacing saved workflow '{}' (step {}/{})",
                saved.workflow_name,
                saved.current_step + 1,
                saved.total_steps
            );
        }
    }

    let sessions = ctx.session_store()?;
    let session = {
        let mut store = lock_sessions(&sessions);
        let session = store.get_or_create_active_session(&mode, spec.clone());
        if let Some(request) = input.as_deref().or(command.as_deref()) {
            store.add_message(&session.id, MessageRole::User, request);
        }
        session
    };
    attach_listeners(&engine, &sessions, json);

    let mut options = StartOptions::new(&mode).with_session(session.id.clone());
    if let Some(spec) = spec {
        options = options.with_spec(spec);
    }
    if let Some(command) = command {
        options = options.with_command(command);
    }
    if let Some(input) = input {
        options = options.with_user_input(input);
    }

    if !json {
        println!("▶️  Starting '{}' in {}", mode, ctx.workspace.display());
    }
    let (outcome, interrupted) = run_until_interrupted(&engine, engine.start(options)).await?;
    report_outcome(&engine, &outcome, Some(session.id.as_str()), json)?;
    Ok(exit_code(&outcome, interrupted))
}

/// Handle the 'resume' command
pub async fn handle_resume(ctx: &AppContext, auto_approve: bool, json: bool) -> Result<i32> {
    let engine = ctx.engine(gateway(auto_approve))?;
    let saved = engine.saved_state()?.ok_or_else(|| {
        anyhow!(
            "No saved workflow for {}. Use 'specloop start' to begin one.",
            ctx.workspace.display()
        )
    })?;

    let sessions = ctx.session_store()?;
    if let Some(session_id) = &saved.session_id {
        if !lock_sessions(&sessions).set_active_session(session_id) {
            tracing::warn!("Session {} linked to the saved workflow no longer exists", session_id);
        }
    }
    attach_listeners(&engine, &sessions, json);

    if !json {
        println!(
            "⏯️  Resuming '{}' at step {}/{}",
            saved.workflow_name,
            saved.current_step + 1,
            saved.total_steps
        );
    }
    let (outcome, interrupted) = run_until_interrupted(&engine, engine.resume()).await?;
    report_outcome(&engine, &outcome, saved.session_id.as_deref(), json)?;
    Ok(exit_code(&outcome, interrupted))
}

/// Handle the 'cancel' command
pub fn handle_cancel(ctx: &AppContext) -> Result<()> {
    let engine = ctx.engine(Arc::new(AutoApproveGateway))?;
    let saved = engine.saved_state()?;

    if !engine.cancel()? {
        println!("ℹ️  No saved workflow for {}", ctx.workspace.display());
        return Ok(());
    }

    if let Some(session_id) = saved.as_ref().and_then(|s| s.session_id.as_deref()) {
        let sessions = ctx.session_store()?;
        let mut store = lock_sessions(&sessions);
        store.clear_session_workflow(session_id);
        store.add_message(session_id, MessageRole::System, "🚫 Workflow cancelled");
    }

    match saved {
        Some(state) => println!("✅ Cancelled workflow '{}'", state.workflow_name),
        None => println!("✅ Cancelled workflow"),
    }
    Ok(())
}

/// Step list of a saved run: earlier steps done, the saved step next
fn saved_view(definition: &WorkflowDefinition, state: &WorkflowRunState) -> ProgressView {
    let steps = definition
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| StepView {
            name: step.name.clone(),
            description: step.description.clone(),
            status: if index < state.current_step {
                StepStatus::Completed
            } else {
                StepStatus::Pending
            },
        })
        .collect();
    ProgressView {
        workflow_name: definition.name.clone(),
        steps,
        current_step: Some(state.current_step),
    }
}

/// Handle the 'status' command
pub fn handle_status(ctx: &AppContext, logs: bool, json: bool) -> Result<()> {
    let engine = ctx.engine(Arc::new(AutoApproveGateway))?;
    let Some(state) = engine.saved_state()? else {
        if json {
            println!("{}", serde_json::to_string_pretty(&json!({ "workflow": null }))?);
        } else {
            println!("ℹ️  No workflow in progress for {}", ctx.workspace.display());
        }
        return Ok(());
    };

    let history = match (&state.session_id, logs) {
        (Some(session_id), true) => {
            let sessions = ctx.session_store()?;
            let session = lock_sessions(&sessions).get_session(session_id);
            session.map(|s| s.conversation_history).unwrap_or_default()
        }
        _ => Vec::new(),
    };

    if json {
        let output = json!({
            "workflow": state,
            "progressPercent": state.progress_percent(),
            "history": history,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match engine.registry().definition_by_name(&state.workflow_name) {
        Some((_, definition)) if definition.total_steps() == state.total_steps => {
            let options = RenderOptions {
                show_timing: false,
                ..RenderOptions::default()
            };
            let view = saved_view(&definition, &state);
            let rendered = ProgressReporter::new(1).render_progress(&view, &options);
            println!("{}", rendered);
        }
        _ => {
            println!("## {}", state.workflow_name);
            println!(
                "Step {}/{} ({}%)",
                state.current_step + 1,
                state.total_steps,
                state.progress_percent()
            );
            println!("⚠️  The workflow definition changed or is no longer registered");
        }
    }

    println!();
    if let Some(spec) = &state.spec_name {
        println!("Spec: {}", spec);
    }
    if let Some(mode) = &state.mode {
        println!("Mode: {}", mode);
    }
    println!("Started: {}", state.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Last updated: {}", state.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));

    if logs {
        println!();
        if history.is_empty() {
            println!("No session history");
        }
        for message in &history {
            println!(
                "[{}] {:?}: {}",
                message.timestamp.format("%H:%M:%S"),
                message.role,
                message.content
            );
        }
    }

    println!();
    println!("Use 'specloop resume' to continue or 'specloop cancel' to discard it");
    Ok(())
}

/// Handle the 'modes' command
pub fn handle_modes(ctx: &AppContext, json: bool) -> Result<()> {
    let registry = ctx.registry()?;
    let modes = registry.modes();

    if json {
        let output: Vec<_> = modes
            .iter()
            .filter_map(|mode| registry.definition_for_mode(mode).map(|def| (mode, def)))
            .map(|(mode, def)| json!({ "mode": mode, "workflow": &*def }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("📋 Workflow modes ({}):", modes.len());
    for mode in &modes {
        let Some(definition) = registry.definition_for_mode(mode) else {
            continue;
        };
        println!();
        println!("  • {} → {}", mode, definition.name);
        if let Some(description) = &definition.description {
            println!("    {}", description);
        }
        for (index, step) in definition.steps.iter().enumerate() {
            let gate = if step.requires_approval { " (approval)" } else { "" };
            println!("    {}. {}{}", index + 1, step.name, gate);
        }
    }
    Ok(())
}

/// Handle the 'validate' command
pub fn handle_validate(ctx: &AppContext, workflow_file: PathBuf, json: bool) -> Result<i32> {
    let definition = load_definition_file(&workflow_file)?;
    let registry = ctx.registry()?;
    let result = WorkflowValidator::validate_with_registry(&definition, &registry);

    if json {
        let errors: Vec<_> = result
            .errors
            .iter()
            .map(|e| json!({ "field": e.field, "message": e.message }))
            .collect();
        let output = json!({
            "workflow": definition.name,
            "valid": result.is_valid(),
            "errors": errors,
            "warnings": result.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        if result.is_valid() {
            println!(
                "✅ Workflow '{}' is valid ({} steps)",
                definition.name,
                definition.total_steps()
            );
        } else {
            println!("❌ Workflow '{}' is invalid:", definition.name);
            for error in &result.errors {
                println!("   - {}: {}", error.field, error.message);
            }
        }
        for warning in &result.warnings {
            println!("⚠️  {}", warning);
        }
    }

    Ok(if result.is_valid() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use specloop_core::models::workflow::StepDefinition;

    /// Test a saved run shows earlier steps as completed
    #[test]
    fn test_saved_view_marks_finished_steps() {
        let definition = WorkflowDefinition::new(
            "spec-workflow",
            vec![
                StepDefinition::new("requirements", "Requirements", "h"),
                StepDefinition::new("design", "Design", "h"),
                StepDefinition::new("tasks", "Tasks", "h"),
            ],
        );
        let mut state = WorkflowRunState::new("spec-workflow", 3);
        state.current_step = 1;

        let view = saved_view(&definition, &state);
        let statuses: Vec<_> = view.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Pending, StepStatus::Pending]
        );
        assert_eq!(view.current_step, Some(1));
        assert_eq!(view.completed_steps(), 1);
    }

    /// Test progress lines are numbered from one
    #[test]
    fn test_progress_line() {
        let event = ProgressEvent {
            workflow_name: "spec-workflow".to_string(),
            total_steps: 3,
            current_step: 0,
            current_step_name: "Requirements".to_string(),
            status: StepStatus::Completed,
            message: Some("Drafted requirements.md".to_string()),
            details: None,
            session_id: None,
        };
        assert_eq!(
            progress_line(&event),
            "✅ [1/3] Requirements: Drafted requirements.md"
        );
    }

    /// Test only an interrupt or an unsuccessful outcome exits non-zero
    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&RunOutcome::Completed, false), 0);
        assert_eq!(exit_code(&RunOutcome::Stopped { step_index: 0 }, false), 0);
        let cancelled = RunOutcome::Cancelled {
            step_index: 1,
            reason: "Reject".to_string(),
        };
        assert_eq!(exit_code(&cancelled, false), 1);
        assert_eq!(exit_code(&cancelled, true), EXIT_INTERRUPTED);
    }
}
