//! Integration tests for WorkflowEngine runs

mod common;

use common::*;
use specloop_core::models::workflow::{
    ApprovalPolicy, RunOutcome, StepDefinition, StepFailure, StepStatus, WorkflowDefinition,
};
use specloop_core::workflow::{
    ChannelApprovalGateway, JsonStateStore, MemoryStateStore, StartOptions, StateStore,
    WorkflowEvent,
};
use specloop_core::WorkflowError;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::Notify;

fn memory_store() -> Arc<MemoryStateStore> {
    Arc::new(MemoryStateStore::new())
}

/// Test a full run emits every transition in order
#[tokio::test]
async fn test_successful_run_emits_transitions_in_order() {
    let handler = ScriptedHandler::new();
    let store = memory_store();
    let gateway = ScriptedGateway::answering(&[]);
    let (engine, listener) = engine(
        three_step_workflow(),
        handler.clone(),
        store.clone(),
        gateway.clone(),
    );

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(handler.calls(), vec!["requirements", "design", "tasks"]);
    assert_eq!(gateway.requested_steps(), vec!["requirements"]);
    assert_eq!(
        listener.statuses(),
        vec![
            (0, StepStatus::InProgress),
            (0, StepStatus::WaitingApproval),
            (0, StepStatus::Completed),
            (1, StepStatus::InProgress),
            (1, StepStatus::Completed),
            (2, StepStatus::InProgress),
            (2, StepStatus::Completed),
            (2, StepStatus::Completed),
        ]
    );
    let last = listener.last();
    assert!(last.details.unwrap().starts_with("Total time:"));
    assert!(store.load(SCOPE).unwrap().is_none());
    assert!(!engine.is_running());
    assert_eq!(engine.get_progress_percent(), 0);
}

/// Test Requirements approved, Design fails: run fails at step 1 and the snapshot is gone
#[tokio::test]
async fn test_failed_step_clears_snapshot() {
    let handler = ScriptedHandler::new();
    handler.on("design", Behavior::Fail("design.md could not be written"));
    let store = memory_store();
    let (engine, listener) = engine(
        three_step_workflow(),
        handler.clone(),
        store.clone(),
        ScriptedGateway::answering(&["Approve"]),
    );

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            step_index: 1,
            failure: StepFailure::Handler("design.md could not be written".to_string()),
        }
    );
    let last = listener.last();
    assert_eq!(last.status, StepStatus::Failed);
    assert_eq!(last.current_step, 1);
    assert_eq!(last.current_step_name, "Design");
    assert!(store.load(SCOPE).unwrap().is_none());
    assert_eq!(handler.calls(), vec!["requirements", "design"]);
}

/// Test a handler error is treated like success = false
#[tokio::test]
async fn test_handler_error_is_a_failure() {
    let handler = ScriptedHandler::new();
    handler.on("requirements", Behavior::Error("template missing"));
    let (engine, listener) = engine(
        three_step_workflow(),
        handler,
        memory_store(),
        ScriptedGateway::answering(&[]),
    );

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            step_index: 0,
            failure: StepFailure::Handler(ref m),
        } if m == "template missing"
    ));
    assert_eq!(listener.last().message.as_deref(), Some("template missing"));
}

/// Test a precondition failure is reported as progress, never as an Err
#[tokio::test]
async fn test_validation_failure_skips_handler() {
    let handler = ScriptedHandler::new();
    handler.on("requirements", Behavior::Invalid("spec name is required"));
    let store = memory_store();
    let (engine, listener) = engine(
        three_step_workflow(),
        handler.clone(),
        store.clone(),
        ScriptedGateway::answering(&[]),
    );

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            step_index: 0,
            failure: StepFailure::Validation("spec name is required".to_string()),
        }
    );
    assert!(handler.calls().is_empty());
    assert_eq!(listener.last().details.as_deref(), Some("validation error"));
    assert!(store.load(SCOPE).unwrap().is_none());
}

/// Test only the canonical approve value advances; every other option halts
#[tokio::test]
async fn test_non_approve_answers_halt_and_clear() {
    for answer in ["Reject", "Skip"] {
        let handler = ScriptedHandler::new();
        let store = memory_store();
        let (engine, listener) = engine(
            three_step_workflow(),
            handler.clone(),
            store.clone(),
            ScriptedGateway::answering(&[answer]),
        );

        let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

        assert!(
            matches!(outcome, RunOutcome::Cancelled { step_index: 0, .. }),
            "answer {}",
            answer
        );
        assert_eq!(handler.calls(), vec!["requirements"]);
        assert_eq!(listener.last().status, StepStatus::Cancelled);
        assert!(store.load(SCOPE).unwrap().is_none());
    }
}

/// Test a custom approval policy approves with its own value
#[tokio::test]
async fn test_custom_approval_policy() {
    let policy = ApprovalPolicy {
        options: vec!["Ship it".to_string(), "Rework".to_string()],
        approve: "Ship it".to_string(),
    };
    let definition = WorkflowDefinition::new(
        "release",
        vec![StepDefinition::new("publish", "Publish", HANDLER).with_approval_policy(policy)],
    );
    let gateway = ScriptedGateway::answering(&["Ship it"]);
    let (engine, _) = engine(definition, ScriptedHandler::new(), memory_store(), gateway.clone());

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    let request = gateway.requests.lock().unwrap()[0].clone();
    assert_eq!(request.options, vec!["Ship it", "Rework"]);
    assert_eq!(request.approve_option, "Ship it");
}

/// Test a step asking to stop ends the run without failure and without approval
#[tokio::test]
async fn test_soft_stop_skips_approval() {
    let definition = WorkflowDefinition::new(
        "handoff",
        vec![
            StepDefinition::new("draft", "Draft", HANDLER).with_approval(),
            StepDefinition::new("review", "Review", HANDLER),
        ],
    );
    let handler = ScriptedHandler::new();
    handler.on("draft", Behavior::Stop);
    let gateway = ScriptedGateway::answering(&[]);
    let store = memory_store();
    let (engine, listener) = engine(definition, handler.clone(), store.clone(), gateway.clone());

    let outcome = engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Stopped { step_index: 0 });
    assert!(gateway.requested_steps().is_empty());
    assert_eq!(handler.calls(), vec!["draft"]);
    assert!(!listener
        .statuses()
        .iter()
        .any(|(_, status)| *status == StepStatus::Failed));
    assert!(store.load(SCOPE).unwrap().is_none());
}

/// Test an approval step that continues still waits for approval
#[tokio::test]
async fn test_continuing_approval_step_waits() {
    let definition = WorkflowDefinition::new(
        "single",
        vec![StepDefinition::new("draft", "Draft", HANDLER).with_approval()],
    );
    let gateway = ScriptedGateway::answering(&[]);
    let (engine, _) = engine(definition, ScriptedHandler::new(), memory_store(), gateway.clone());

    engine.start(StartOptions::new(MODE)).await.unwrap();

    assert_eq!(gateway.requested_steps(), vec!["draft"]);
}

/// Test cancelling before the first step completes leaves no snapshot
#[tokio::test]
async fn test_cancel_before_first_step_completes() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handler = ScriptedHandler::new();
    handler.on(
        "requirements",
        Behavior::Block {
            entered: entered.clone(),
            release: release.clone(),
        },
    );
    let store = memory_store();
    let (engine, listener) = engine(
        three_step_workflow(),
        handler.clone(),
        store.clone(),
        ScriptedGateway::answering(&[]),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start(StartOptions::new(MODE)).await })
    };
    entered.notified().await;
    assert!(engine.is_running());
    assert!(store.load(SCOPE).unwrap().is_some());

    assert!(engine.cancel().unwrap());
    assert!(store.load(SCOPE).unwrap().is_none());
    assert!(!engine.is_running());

    release.notify_one();
    let outcome = run.await.unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled { step_index: 0, .. }));
    assert_eq!(handler.calls(), vec!["requirements"]);
    assert_eq!(listener.last().status, StepStatus::Cancelled);
    assert!(store.load(SCOPE).unwrap().is_none());
}

/// Test cancelling during the approval wait leaves the gateway request dangling
#[tokio::test]
async fn test_cancel_during_approval_wait() {
    let gateway = Arc::new(ChannelApprovalGateway::new());
    let mut announcements = gateway.subscribe();
    let handler = ScriptedHandler::new();
    let store = memory_store();
    let (engine, _) = engine(
        three_step_workflow(),
        handler.clone(),
        store.clone(),
        gateway.clone(),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start(StartOptions::new(MODE)).await })
    };
    let pending = announcements.recv().await.unwrap();
    assert_eq!(pending.request.step_id, "requirements");

    assert!(engine.cancel().unwrap());
    let outcome = run.await.unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled { step_index: 0, .. }));
    assert_eq!(gateway.pending().len(), 1);
    assert!(store.load(SCOPE).unwrap().is_none());
    assert_eq!(handler.calls(), vec!["requirements"]);
}

/// Test a second start while a run is in flight is rejected
#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handler = ScriptedHandler::new();
    handler.on(
        "requirements",
        Behavior::Block {
            entered: entered.clone(),
            release: release.clone(),
        },
    );
    let (engine, _) = engine(
        three_step_workflow(),
        handler,
        memory_store(),
        ScriptedGateway::answering(&[]),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start(StartOptions::new(MODE)).await })
    };
    entered.notified().await;

    let err = engine.start(StartOptions::new(MODE)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyRunning(ref name) if name == "three-step"));
    assert!(matches!(engine.resume().await, Err(WorkflowError::AlreadyRunning(_))));

    release.notify_one();
    assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Completed);
}

/// Test the snapshot on disk tracks every transition
#[tokio::test]
async fn test_snapshot_persisted_after_each_transition() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path().join("workflow_state.json")).unwrap());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handler = ScriptedHandler::new();
    handler.on(
        "design",
        Behavior::Block {
            entered: entered.clone(),
            release: release.clone(),
        },
    );
    let (engine, _) = engine(
        three_step_workflow(),
        handler,
        store.clone(),
        ScriptedGateway::answering(&[]),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .start(StartOptions::new(MODE).with_spec("checkout"))
                .await
        })
    };
    entered.notified().await;

    let snapshot = store.load(SCOPE).unwrap().unwrap();
    assert_eq!(snapshot.workflow_name, "three-step");
    assert_eq!(snapshot.current_step, 1);
    assert_eq!(snapshot.total_steps, 3);
    assert_eq!(snapshot.spec_name.as_deref(), Some("checkout"));
    assert_eq!(snapshot.mode.as_deref(), Some(MODE));
    assert_eq!(engine.get_progress_percent(), 33);
    assert_eq!(engine.get_state().unwrap().current_step, 1);

    release.notify_one();
    run.await.unwrap().unwrap();
    assert!(store.load(SCOPE).unwrap().is_none());
    assert!(!dir.path().join("workflow_state.json").exists());
}

/// Test broadcast subscribers see progress, approval and the final outcome
#[tokio::test]
async fn test_subscribers_receive_events() {
    let (engine, _) = engine(
        three_step_workflow(),
        ScriptedHandler::new(),
        memory_store(),
        ScriptedGateway::answering(&[]),
    );
    let mut events = engine.subscribe();

    engine
        .start(StartOptions::new(MODE).with_session("session-1"))
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        &received[0],
        WorkflowEvent::Progress(e) if e.status == StepStatus::InProgress
    ));
    assert!(received.iter().any(|e| matches!(
        e,
        WorkflowEvent::ApprovalRequested(r) if r.session_id.as_deref() == Some("session-1")
    )));
    assert!(matches!(
        received.last(),
        Some(WorkflowEvent::Finished {
            outcome: RunOutcome::Completed,
            session_id: Some(id),
            ..
        }) if id == "session-1"
    ));
}

/// Test the rendered view after a failed run highlights the failed step
#[tokio::test]
async fn test_progress_view_after_failure() {
    let handler = ScriptedHandler::new();
    handler.on("design", Behavior::Fail("boom"));
    let (engine, _) = engine(
        three_step_workflow(),
        handler,
        memory_store(),
        ScriptedGateway::answering(&[]),
    );

    engine.start(StartOptions::new(MODE)).await.unwrap();

    let view = engine.progress_view().unwrap();
    let statuses: Vec<_> = view.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
    );
    assert_eq!(view.current_step, Some(1));
}
