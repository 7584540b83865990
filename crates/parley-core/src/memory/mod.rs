//! Conversation history: the durable, session-keyed log of messages
//!
//! History is read before an invocation and the turns it produced are
//! appended afterwards. Appends for one session are serialized with
//! `SessionLocks` so two overlapping invocations never interleave.

pub mod sqlite;
pub mod window;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core_types::Message;
use crate::errors::AgentError;

pub use sqlite::SqliteHistoryStore;
pub use window::trim_history;

#[async_trait]
pub trait ConversationHistoryStore: Send + Sync {
    /// Messages for the session in the order they were appended.
    async fn read(&self, session_id: &str) -> Result<Vec<Message>, AgentError>;
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), AgentError>;
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationHistoryStore for InMemoryHistoryStore {
    async fn read(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), AgentError> {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}

/// One async mutex per session id.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`. The lock is held until the
    /// returned guard is dropped.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn active_sessions(&self) -> usize {
        self.locks.lock().await.len()
    }
}
