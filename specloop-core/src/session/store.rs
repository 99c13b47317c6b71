//! Bounded store of conversational sessions
//!
//! Mutations go through `&mut self`; share the store as a
//! [`SharedSessionStore`] to serialize writers. When backed by a file, every
//! mutation is written through atomically.

use crate::error::PersistenceError;
use crate::models::configuration::Configuration;
use crate::models::session::{
    ChatMessage, MessageRole, Session, SessionStoreData, SessionWorkflowState,
};
use crate::workflow::persistence::AtomicJsonFile;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Sessions kept after a cleanup pass
pub const MAX_SESSIONS: usize = 10;
/// Idle hours after which an inactive session is evicted
pub const SESSION_TIMEOUT_HOURS: i64 = 24;
/// Conversation entries kept per session
pub const MAX_HISTORY_MESSAGES: usize = 50;

/// Session store shared between the CLI and workflow listeners
pub type SharedSessionStore = Arc<Mutex<SessionStore>>;

/// Capacity and eviction limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub session_timeout: Duration,
    pub max_history_messages: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            session_timeout: Duration::hours(SESSION_TIMEOUT_HOURS),
            max_history_messages: MAX_HISTORY_MESSAGES,
        }
    }
}

impl From<&Configuration> for SessionLimits {
    fn from(config: &Configuration) -> Self {
        Self {
            max_sessions: config.max_sessions,
            session_timeout: Duration::hours(i64::from(config.session_timeout_hours)),
            max_history_messages: config.max_history_messages,
        }
    }
}

pub struct SessionStore {
    data: SessionStoreData,
    limits: SessionLimits,
    file: Option<AtomicJsonFile<SessionStoreData>>,
}

impl SessionStore {
    /// Store that lives only in memory
    pub fn in_memory(limits: SessionLimits) -> Self {
        Self {
            data: SessionStoreData::default(),
            limits,
            file: None,
        }
    }

    /// Open (or create) a file-backed store and run a cleanup pass
    pub fn open<P: AsRef<Path>>(path: P, limits: SessionLimits) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let file = AtomicJsonFile::new(path);
        let data = {
            let _lock = file.lock()?;
            file.load()?.unwrap_or_default()
        };

        let mut store = Self {
            data,
            limits,
            file: Some(file),
        };
        store.repair_active_flags();
        let removed = store.cleanup_sessions();
        tracing::debug!(
            path = %path.display(),
            sessions = store.data.sessions.len(),
            removed = removed,
            "Loaded session store"
        );
        store.save()?;
        Ok(store)
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.data.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.sessions.is_empty()
    }

    /// Create a session for `mode`
    ///
    /// The new session becomes active only when no other session is; use
    /// [`SessionStore::set_active_session`] to switch.
    pub fn create_session(&mut self, mode: &str, spec_name: Option<String>) -> Session {
        let mut session = Session::new(mode, spec_name);
        session.is_active = self.data.active_session_id.is_none();
        if session.is_active {
            self.data.active_session_id = Some(session.id.clone());
        }

        tracing::info!(session = %session.id, mode = mode, "Created session");
        self.data
            .sessions
            .insert(session.id.clone(), session.clone());
        self.persist();
        session
    }

    /// Fetch a session, counting the read as activity
    pub fn get_session(&mut self, id: &str) -> Option<Session> {
        let Some(session) = self.data.sessions.get_mut(id) else {
            tracing::warn!(session = id, "Session not found");
            return None;
        };
        session.touch();
        let session = session.clone();
        self.persist();
        Some(session)
    }

    pub fn get_active_session(&mut self) -> Option<Session> {
        let id = self.data.active_session_id.clone()?;
        self.get_session(&id)
    }

    /// Active session of `mode`, creating and activating one if needed
    pub fn get_or_create_active_session(
        &mut self,
        mode: &str,
        spec_name: Option<String>,
    ) -> Session {
        if let Some(active) = self.get_active_session() {
            if active.mode == mode {
                return active;
            }
        }

        let session = self.create_session(mode, spec_name);
        if !session.is_active {
            self.set_active_session(&session.id);
            return self
                .data
                .sessions
                .get(&session.id)
                .cloned()
                .unwrap_or(session);
        }
        session
    }

    /// Make `id` the only active session; false for an unknown id
    pub fn set_active_session(&mut self, id: &str) -> bool {
        if !self.data.sessions.contains_key(id) {
            tracing::warn!(session = id, "Cannot activate unknown session");
            return false;
        }

        for session in self.data.sessions.values_mut() {
            session.is_active = session.id == id;
            if session.is_active {
                session.touch();
            }
        }
        self.data.active_session_id = Some(id.to_string());
        tracing::info!(session = id, "Activated session");
        self.persist();
        true
    }

    /// Record workflow linkage on a session
    ///
    /// A `None` context snapshot keeps the one already stored.
    pub fn update_session_workflow(&mut self, id: &str, update: SessionWorkflowState) -> bool {
        let Some(session) = self.data.sessions.get_mut(id) else {
            tracing::warn!(session = id, "Cannot update workflow of unknown session");
            return false;
        };

        session.workflow_name = Some(update.workflow_name);
        session.current_step = Some(update.current_step);
        session.total_steps = Some(update.total_steps);
        if update.context_snapshot.is_some() {
            session.workflow_context_snapshot = update.context_snapshot;
        }
        session.touch();
        self.persist();
        true
    }

    /// Drop the workflow linkage of a session, keeping the conversation
    pub fn clear_session_workflow(&mut self, id: &str) -> bool {
        let Some(session) = self.data.sessions.get_mut(id) else {
            tracing::warn!(session = id, "Cannot clear workflow of unknown session");
            return false;
        };
        session.clear_workflow();
        session.touch();
        self.persist();
        true
    }

    /// Append a conversation entry, evicting the oldest beyond the cap
    pub fn add_message(&mut self, id: &str, role: MessageRole, content: &str) -> bool {
        let max_history = self.limits.max_history_messages;
        let Some(session) = self.data.sessions.get_mut(id) else {
            tracing::warn!(session = id, "Cannot add message to unknown session");
            return false;
        };

        session.conversation_history.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        let overflow = session.conversation_history.len().saturating_sub(max_history);
        if overflow > 0 {
            session.conversation_history.drain(..overflow);
        }
        session.touch();
        self.persist();
        true
    }

    /// Deactivate a session whose workflow finished; the session is kept
    pub fn complete_session(&mut self, id: &str) -> bool {
        let Some(session) = self.data.sessions.get_mut(id) else {
            tracing::warn!(session = id, "Cannot complete unknown session");
            return false;
        };

        session.is_active = false;
        session.clear_workflow();
        session.touch();
        if self.data.active_session_id.as_deref() == Some(id) {
            self.data.active_session_id = None;
        }
        tracing::info!(session = id, "Completed session");
        self.persist();
        true
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        if self.data.sessions.remove(id).is_none() {
            tracing::warn!(session = id, "Cannot delete unknown session");
            return false;
        }
        if self.data.active_session_id.as_deref() == Some(id) {
            self.data.active_session_id = None;
        }
        tracing::info!(session = id, "Deleted session");
        self.persist();
        true
    }

    /// Evict idle and surplus sessions; returns how many were removed
    pub fn cleanup_sessions(&mut self) -> usize {
        self.cleanup_sessions_at(Utc::now())
    }

    /// Cleanup pass evaluated at `now`
    ///
    /// Inactive sessions idle longer than the timeout go first. If the store
    /// is still over capacity, inactive sessions are evicted least recently
    /// active first. The active session is never evicted.
    pub fn cleanup_sessions_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.data.sessions.len();
        let timeout = self.limits.session_timeout;

        self.data
            .sessions
            .retain(|_, s| s.is_active || now - s.last_activity <= timeout);

        if self.data.sessions.len() > self.limits.max_sessions {
            let mut inactive: Vec<(DateTime<Utc>, String)> = self
                .data
                .sessions
                .values()
                .filter(|s| !s.is_active)
                .map(|s| (s.last_activity, s.id.clone()))
                .collect();
            inactive.sort();

            let surplus = self.data.sessions.len() - self.limits.max_sessions;
            for (_, id) in inactive.into_iter().take(surplus) {
                self.data.sessions.remove(&id);
            }
        }

        let removed = before - self.data.sessions.len();
        if removed > 0 {
            tracing::info!(removed = removed, "Cleaned up sessions");
            self.persist();
        }
        removed
    }

    /// Workflow linkage of a session, if it has a run to resume
    pub fn restore_workflow_state(&mut self, id: &str) -> Option<SessionWorkflowState> {
        let session = self.get_session(id)?;
        Some(SessionWorkflowState {
            workflow_name: session.workflow_name?,
            context_snapshot: session.workflow_context_snapshot,
            current_step: session.current_step?,
            total_steps: session.total_steps?,
        })
    }

    /// Every session, most recently active first; reading does not touch
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.data.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        sessions
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.data.active_session_id.as_deref()
    }

    pub fn clear_all(&mut self) {
        self.data = SessionStoreData::default();
        tracing::info!("Cleared all sessions");
        self.persist();
    }

    /// Write the store to its file; a no-op for in-memory stores
    pub fn save(&self) -> Result<(), PersistenceError> {
        debug_assert!(
            self.data.sessions.values().filter(|s| s.is_active).count() <= 1,
            "more than one active session"
        );
        if let Some(file) = &self.file {
            let _lock = file.lock()?;
            file.save(&self.data)?;
        }
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::error!("Failed to save session store: {}", e);
        }
    }

    /// Make the active flags agree with `active_session_id` after a load
    fn repair_active_flags(&mut self) {
        let active_id = match &self.data.active_session_id {
            Some(id) if self.data.sessions.contains_key(id) => Some(id.clone()),
            _ => self
                .data
                .sessions
                .values()
                .filter(|s| s.is_active)
                .max_by_key(|s| s.last_activity)
                .map(|s| s.id.clone()),
        };

        for session in self.data.sessions.values_mut() {
            session.is_active = Some(&session.id) == active_id.as_ref();
        }
        self.data.active_session_id = active_id;
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory(SessionLimits::default())
    }
}
