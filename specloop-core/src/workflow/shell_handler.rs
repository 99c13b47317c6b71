//! Shell command step handler
//!
//! Runs the step's `command` through `bash -c` and turns the exit status into
//! a step result. Registered under [`SHELL_HANDLER_REF`].

use crate::models::workflow::{StepDefinition, StepResult, WorkflowContext};
use crate::workflow::handler::StepHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

/// Handler reference of the built-in shell handler
pub const SHELL_HANDLER_REF: &str = "shell";

/// Maximum stdout bytes kept in the context bag
const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

/// Bash command step handler
#[derive(Debug, Clone, Default)]
pub struct ShellStepHandler {
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellStepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill commands that run longer than `limit`
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    fn build_command(
        &self,
        command: &str,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .env("SPECLOOP_MODE", &context.mode)
            .env("SPECLOOP_STEP", &step.id)
            .env("SPECLOOP_SPEC", context.spec_name.as_deref().unwrap_or(""))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(input) = &context.user_input {
            cmd.env("SPECLOOP_INPUT", input);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl StepHandler for ShellStepHandler {
    fn validate(&self, step: &StepDefinition, _context: &WorkflowContext) -> Result<(), String> {
        match step.command.as_deref() {
            Some(command) if !command.trim().is_empty() => Ok(()),
            _ => Err(format!("Step '{}' has no command to execute", step.id)),
        }
    }

    async fn handle(
        &self,
        step: &StepDefinition,
        context: &mut WorkflowContext,
    ) -> Result<StepResult> {
        let start_time = Instant::now();
        let command = step
            .command
            .as_deref()
            .context("Step has no command to execute")?;

        let mut child = self
            .build_command(command, step, context)
            .spawn()
            .context("Failed to spawn bash process")?;

        let stdout = child.stdout.take().context("Failed to get stdout")?;
        let stderr = child.stderr.take().context("Failed to get stderr")?;

        let stdout_task = tokio::spawn(async move {
            let mut captured = String::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!("stdout: {}", line);
                if captured.len() < MAX_CAPTURED_OUTPUT {
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            captured
        });

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!("stderr: {}", line);
            }
        });

        let status = match self.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status.context("Failed to wait for process")?,
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = stderr_task.await;
                    return Ok(StepResult::fail(format!(
                        "Command timed out after {} seconds",
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait().await.context("Failed to wait for process")?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let _ = stderr_task.await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let data = json!({
            "exitCode": status.code(),
            "stdout": stdout,
            "durationMs": duration_ms,
        });

        if status.success() {
            Ok(StepResult::ok()
                .with_message(format!("Command finished in {} ms", duration_ms))
                .with_data(data))
        } else {
            Ok(StepResult::fail(format!(
                "Command failed with exit code {:?}",
                status.code()
            ))
            .with_data(data))
        }
    }
}
