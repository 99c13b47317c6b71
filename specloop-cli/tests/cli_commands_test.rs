
use cli_tests::{run_specloop, stdout, Sandbox};

#[test]
fn test_help_shows_commands() {
    let help_text = run_specloop(&["--help"]).expect("Failed to get help text");

    for command in [
        "start", "resume", "cancel", "status", "modes", "validate", "tasks", "sessions", "config",
    ] {
        assert!(
            help_text.contains(command),
            "Help text should list '{}'\nActual: {}",
            command,
            help_text
        );
    }
}

#[test]
fn test_version_output() {
    let version_text = run_specloop(&["--version"]).expect("Failed to get version text");
    assert!(
        version_text.contains(env!("CARGO_PKG_VERSION")),
        "Version output should contain the package version\nActual: {}",
        version_text
    );
}

/// Test the built-in modes are listed
#[test]
fn test_modes_json() {
    let sandbox = Sandbox::new();
    let modes = sandbox.run_json(&["modes", "--json"]);

    let names: Vec<_> = modes
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["mode"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["quick", "spec"]);
    assert_eq!(modes[1]["workflow"]["steps"].as_array().unwrap().len(), 3);
}

/// Test a quick run hands off and succeeds
#[test]
fn test_quick_start_hands_off() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_json(&[
        "start",
        "quick",
        "--input",
        "Rename the config loader",
        "--json",
    ]);

    assert_eq!(output["workflow"], "quick-workflow");
    assert_eq!(output["outcome"], "stopped");
    assert_eq!(output["stepIndex"], 0);

    let sessions = sandbox.run_json(&["sessions", "list", "--json"]);
    let history = &sessions[0]["conversationHistory"];
    assert_eq!(history[0]["content"], "Rename the config loader");
}

/// Test an auto-approved spec run drafts every document
#[test]
fn test_spec_start_auto_approved() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["start", "spec", "--spec", "checkout", "--yes"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Workflow 'spec-workflow' completed"));

    let spec_dir = sandbox.workspace().join(".specloop/specs/checkout");
    for file in ["requirements.md", "design.md", "tasks.md"] {
        assert!(spec_dir.join(file).exists(), "{} missing", file);
    }

    let status = sandbox.run_json(&["status", "--json"]);
    assert!(status["workflow"].is_null());
}

/// Test a closed stdin at the approval prompt cancels the run
#[test]
fn test_spec_start_without_terminal_is_cancelled() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["start", "spec", "--spec", "checkout", "--json"]);

    assert_eq!(output.status.code(), Some(1));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["outcome"], "cancelled");
    assert_eq!(outcome["stepIndex"], 0);

    let status = sandbox.run_json(&["status", "--json"]);
    assert!(status["workflow"].is_null());
}

/// Test a failed precondition ends the run without a saved snapshot
#[test]
fn test_spec_start_without_spec_name_fails() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_json(&["start", "spec", "--yes", "--json"]);

    assert_eq!(output["outcome"], "failed");
    assert!(output["message"].as_str().unwrap().contains("--spec"));
}

/// Test resume and cancel with nothing saved
#[test]
fn test_resume_without_saved_workflow() {
    let sandbox = Sandbox::new();

    let output = sandbox.run(&["resume"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No saved workflow"));

    let output = sandbox.run(&["cancel"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No saved workflow"));
}

/// Test unknown modes are rejected up front
#[test]
fn test_unknown_mode() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["start", "deploy"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown mode 'deploy'"));
}

/// Test validation reports unregistered handlers
#[test]
fn test_validate_workflow_file() {
    let sandbox = Sandbox::new();
    let file = sandbox.path().join("custom.yaml");
    std::fs::write(
        &file,
        "name: custom\nsteps:\n  - id: lint\n    name: Lint\n    handler_ref: shell\n    command: \"true\"\n  - id: deploy\n    name: Deploy\n    handler_ref: deployer\n",
    )
    .unwrap();

    let output = sandbox.run(&["validate", file.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], false);
    assert_eq!(report["errors"][0]["field"], "steps[1].handler_ref");
}

/// Test a user workflow from the workflows directory runs shell steps
#[test]
fn test_user_shell_workflow_runs() {
    let sandbox = Sandbox::new();
    let workflows = sandbox.path().join("state").join("workflows");
    std::fs::create_dir_all(&workflows).unwrap();
    std::fs::write(
        workflows.join("touch.yaml"),
        "name: touch\nsteps:\n  - id: touch\n    name: Touch\n    handler_ref: shell\n    command: touch marker.txt\n",
    )
    .unwrap();

    let output = sandbox.run_json(&["start", "touch", "--json"]);
    assert_eq!(output["outcome"], "completed");
    assert!(sandbox.workspace().join("marker.txt").exists());
}

/// Test the checklist summary
#[test]
fn test_tasks_summary() {
    let sandbox = Sandbox::new();
    let file = sandbox.path().join("tasks.md");
    std::fs::write(
        &file,
        "- [x] 1. Setup\n  - [x] 1.1 Models\n- [ ] 2. API\n  - _Requirements: 1.2_\n- [ ]* 3. Docs\n",
    )
    .unwrap();

    let output = sandbox.run_json(&["tasks", file.to_str().unwrap(), "--json"]);
    assert_eq!(output["summary"]["total"], 4);
    assert_eq!(output["summary"]["completed"], 2);
    assert_eq!(output["percent"], 50);
    assert_eq!(output["next"]["title"], "API");
    assert_eq!(output["next"]["requirements"][0], "1.2");
}

/// Test listing, showing, activating and deleting sessions
#[test]
fn test_sessions_lifecycle() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_json(&["start", "quick", "--input", "Tidy imports", "--json"]);
    let session_id = output["sessionId"].as_str().unwrap().to_string();

    let sessions = sandbox.run_json(&["sessions", "list", "--json"]);
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["id"], session_id.as_str());
    assert_eq!(sessions[0]["isActive"], true);

    let shown = sandbox.run_json(&["sessions", "show", "--json"]);
    assert_eq!(shown["id"], session_id.as_str());
    assert_eq!(shown["conversationHistory"][0]["content"], "Tidy imports");

    assert!(!sandbox.run(&["sessions", "activate", "session-missing"]).status.success());
    assert!(sandbox.run(&["sessions", "activate", &session_id]).status.success());

    let cleanup = sandbox.run(&["sessions", "cleanup"]);
    assert!(stdout(&cleanup).contains("Removed 0 session(s)"));

    let deleted = sandbox.run(&["sessions", "delete", &session_id]);
    assert!(deleted.status.success());
    let sessions = sandbox.run_json(&["sessions", "list", "--json"]);
    assert!(sessions.as_array().unwrap().is_empty());
    assert!(!sandbox.run(&["sessions", "delete", &session_id]).status.success());

    sandbox.run_json(&["start", "quick", "--input", "Rename module", "--json"]);
    let cleared = sandbox.run(&["sessions", "clear", "--yes"]);
    assert!(cleared.status.success());
    let sessions = sandbox.run_json(&["sessions", "list", "--json"]);
    assert!(sessions.as_array().unwrap().is_empty());
}
