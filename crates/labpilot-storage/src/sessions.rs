//! Conversation sessions and their message history.
//!
//! Each session lives behind its own `tokio::sync::Mutex`. That mutex is fair,
//! so whoever holds the handle for the duration of a message gets FIFO
//! serialization per session while other sessions proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use labpilot_core::config::RetentionConfig;
use labpilot_core::error::{LabpilotError, Result};
use labpilot_core::types::{Message, SessionId};

/// Shared, lockable handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

// =============================================================================
// Session
// =============================================================================

/// One conversation: an ordered message history.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    messages: Vec<Message>,
    max_messages: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session that keeps at most `max_messages` messages.
    pub fn new(id: SessionId, max_messages: Option<usize>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            max_messages,
            created_at: Utc::now(),
        }
    }

    /// Append a message, dropping the oldest ones beyond the retention limit.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        if let Some(max) = self.max_messages {
            if self.messages.len() > max {
                let excess = self.messages.len() - max;
                self.messages.drain(..excess);
            }
        }
    }

    /// Full history, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// =============================================================================
// SessionStore
// =============================================================================

#[derive(Debug)]
struct SessionSlot {
    handle: SessionHandle,
    last_touched: DateTime<Utc>,
}

/// All live sessions, created lazily on first use.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    max_history_messages: Option<usize>,
    idle_timeout: Option<Duration>,
}

impl SessionStore {
    /// Create a store with no retention limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store honoring the history and idle limits of `retention`.
    pub fn with_retention(retention: &RetentionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_messages: retention.max_history_messages,
            idle_timeout: retention
                .session_idle_minutes
                .map(|m| Duration::minutes(i64::from(m))),
        }
    }

    /// Handle to the session with this id, creating it if needed.
    ///
    /// Touching the store also drops sessions idle past the configured
    /// timeout, unless someone is still holding their handle.
    pub fn session(&self, id: &SessionId) -> Result<SessionHandle> {
        let now = Utc::now();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| LabpilotError::Storage(format!("Lock poisoned: {}", e)))?;

        if let Some(timeout) = self.idle_timeout {
            let before = sessions.len();
            sessions.retain(|sid, slot| {
                sid == id
                    || Arc::strong_count(&slot.handle) > 1
                    || now - slot.last_touched <= timeout
            });
            let dropped = before - sessions.len();
            if dropped > 0 {
                info!(dropped, "Idle sessions dropped");
            }
        }

        let max = self.max_history_messages;
        let slot = sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session_id = %id, "Session created");
            SessionSlot {
                handle: Arc::new(Mutex::new(Session::new(id.clone(), max))),
                last_touched: now,
            }
        });
        slot.last_touched = now;
        Ok(Arc::clone(&slot.handle))
    }

    /// Copy of a session's full history, oldest first.
    ///
    /// Waits behind any message currently being processed for the session.
    pub async fn history(&self, id: &SessionId) -> Result<Vec<Message>> {
        let handle = self.session(id)?;
        let session = handle.lock().await;
        Ok(session.history().to_vec())
    }

    /// Clear a session's history. Registries are unaffected.
    pub async fn clear(&self, id: &SessionId) -> Result<()> {
        let handle = self.session(id)?;
        let mut session = handle.lock().await;
        let dropped = session.len();
        session.clear();
        info!(session_id = %id, dropped, "Session history cleared");
        Ok(())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn backdate(&self, id: &SessionId, by: Duration) {
        if let Ok(mut sessions) = self.sessions.write() {
            if let Some(slot) = sessions.get_mut(id) {
                slot.last_touched = slot.last_touched - by;
            }
        }
    }
}
