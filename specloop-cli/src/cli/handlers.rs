//! Handlers for the standalone `tasks` and `config` commands

use super::context::AppContext;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use specloop_core::tasks::{next_pending, parse_tasks, summarize, TaskItem};
use std::path::PathBuf;

/// Checklist line for one task, indented by nesting depth
fn task_line(tasks: &[TaskItem], task: &TaskItem) -> String {
    let mut depth = 0;
    let mut parent = task.parent;
    while let Some(index) = parent {
        depth += 1;
        parent = tasks.get(index).and_then(|t| t.parent);
    }

    let mark = if task.completed { "✅" } else { "⬜" };
    let number = task
        .number
        .as_deref()
        .map(|n| format!("{} ", n))
        .unwrap_or_default();
    let optional = if task.optional { " (optional)" } else { "" };
    format!("{}{} {}{}{}", "  ".repeat(depth + 1), mark, number, task.title, optional)
}

/// Handle the 'tasks' command
pub async fn handle_tasks(file: PathBuf, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let tasks = parse_tasks(&content);
    let summary = summarize(&tasks);
    let next = next_pending(&tasks);

    if json {
        let output = json!({
            "file": file.display().to_string(),
            "summary": summary,
            "percent": summary.percent(),
            "next": next,
            "tasks": tasks,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "📋 {}: {}/{} done ({}%)",
        file.display(),
        summary.completed,
        summary.total,
        summary.percent()
    );
    for task in &tasks {
        println!("{}", task_line(&tasks, task));
    }
    match next {
        Some(task) => println!("\nNext: {}", task.title),
        None if summary.total > 0 => println!("\n✅ All required tasks are done"),
        None => println!("No tasks found"),
    }
    Ok(())
}

/// Handle the 'config' command
pub fn handle_config(ctx: &AppContext, init: bool) -> Result<()> {
    if init {
        if ctx.config_path.exists() {
            return Err(anyhow!(
                "Config file {} already exists",
                ctx.config_path.display()
            ));
        }
        ctx.config
            .save_to_file(&ctx.config_path)
            .map_err(|e| anyhow!("Failed to write {}: {}", ctx.config_path.display(), e))?;
        println!("✅ Wrote {}", ctx.config_path.display());
        return Ok(());
    }

    let source = if ctx.config_path.exists() {
        ctx.config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", ctx.config_path.display())
    };
    println!("Config file: {}", source);
    println!("Workspace: {}", ctx.workspace.display());
    println!("State directory: {}", ctx.config.resolved_state_dir().display());
    println!("Workflows directory: {}", ctx.config.resolved_workflows_dir().display());
    println!();
    print!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}
