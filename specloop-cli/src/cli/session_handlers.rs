//! Session command handlers

use super::context::AppContext;
use super::session::SessionCommands;
use anyhow::{anyhow, Context, Result};
use specloop_core::models::session::Session;
use specloop_core::session::{SessionStore, SharedSessionStore};
use std::io::{self, BufRead, Write};
use std::sync::{MutexGuard, PoisonError};

fn lock(sessions: &SharedSessionStore) -> MutexGuard<'_, SessionStore> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-line summary used by `sessions list`
fn summary_line(session: &Session) -> String {
    let marker = if session.is_active { "●" } else { "○" };
    let mut line = format!("{} {} [{}]", marker, session.id, session.mode);
    if let Some(spec) = &session.spec_name {
        line.push_str(&format!(" spec={}", spec));
    }
    if let (Some(workflow), Some(step), Some(total)) =
        (&session.workflow_name, session.current_step, session.total_steps)
    {
        line.push_str(&format!(" {} {}/{}", workflow, step + 1, total));
    }
    line
}

/// Dispatch a `sessions` subcommand
pub fn handle_session_commands(ctx: &AppContext, command: SessionCommands) -> Result<()> {
    let sessions = ctx.session_store()?;
    match command {
        SessionCommands::List { json } => handle_list(&sessions, json),
        SessionCommands::Show { session_id, json } => handle_show(&sessions, session_id, json),
        SessionCommands::Activate { session_id } => {
            if !lock(&sessions).set_active_session(&session_id) {
                return Err(anyhow!("Session '{}' not found", session_id));
            }
            println!("✅ Activated session {}", session_id);
            Ok(())
        }
        SessionCommands::Delete { session_id } => {
            if !lock(&sessions).delete_session(&session_id) {
                return Err(anyhow!("Session '{}' not found", session_id));
            }
            println!("✅ Deleted session {}", session_id);
            Ok(())
        }
        SessionCommands::Cleanup => {
            let removed = lock(&sessions).cleanup_sessions();
            println!("✅ Removed {} session(s)", removed);
            Ok(())
        }
        SessionCommands::Clear { yes } => handle_clear(&sessions, yes),
    }
}

fn handle_list(sessions: &SharedSessionStore, json: bool) -> Result<()> {
    let list = lock(sessions).list_sessions();

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if list.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    println!("💬 Sessions ({}):", list.len());
    for session in &list {
        println!(
            "  {}  (last active {})",
            summary_line(session),
            session.last_activity.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn handle_show(
    sessions: &SharedSessionStore,
    session_id: Option<String>,
    json: bool,
) -> Result<()> {
    let session = {
        let mut store = lock(sessions);
        match &session_id {
            Some(id) => store.get_session(id),
            None => store.get_active_session(),
        }
    };
    let session = session.ok_or_else(|| match session_id {
        Some(id) => anyhow!("Session '{}' not found", id),
        None => anyhow!("No active session"),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("{}", summary_line(&session));
    println!("Started: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Last activity: {}", session.last_activity.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(context) = &session.workflow_context_snapshot {
        let keys: Vec<_> = context.data.keys().collect();
        println!("Context: {}", keys.join(", "));
    }
    println!();
    for message in &session.conversation_history {
        println!(
            "[{}] {:?}: {}",
            message.timestamp.format("%H:%M:%S"),
            message.role,
            message.content
        );
    }
    Ok(())
}

fn handle_clear(sessions: &SharedSessionStore, yes: bool) -> Result<()> {
    if !yes {
        print!("Delete every session? [y/N]: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }

    lock(sessions).clear_all();
    println!("✅ Cleared all sessions");
    Ok(())
}
