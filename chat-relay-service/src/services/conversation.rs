//! In-memory conversation histories keyed by session id.

use crate::models::Message;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock-protected history of a single session.
pub type SessionHistory = Arc<Mutex<Vec<Message>>>;

/// Process-scoped session table.
///
/// Each session has its own mutex, so turns on different sessions never
/// contend. Sessions are never evicted; memory grows with the number of
/// sessions and the length of their histories.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    sessions: Arc<DashMap<String, SessionHistory>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to a session's history, creating an empty one if absent.
    fn session(&self, session_id: &str) -> SessionHistory {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Lock a session for the duration of a turn.
    ///
    /// Holding the guard serializes turns on the same session; other sessions
    /// are unaffected.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<Vec<Message>> {
        self.session(session_id).lock_owned().await
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        self.lock(session_id).await.push(message);
    }

    /// Ordered snapshot of a session's history; empty for unknown sessions.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let handle = self.sessions.get(session_id).map(|h| h.clone());
        match handle {
            Some(history) => history.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Empty a session's history. Unknown sessions are left absent.
    pub async fn clear(&self, session_id: &str) {
        let handle = self.sessions.get(session_id).map(|h| h.clone());
        if let Some(history) = handle {
            history.lock().await.clear();
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
