//! Application state shared across all request handlers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::common::config::AgentConfig;
use crate::common::ids::SessionId;
use crate::conversation::{ConversationStore, FeedbackLog};
use crate::pipeline::ChatPipeline;

/// Shared application state.
pub struct AppState {
    /// Loaded configuration; `storage` locates and greets sessions.
    pub config: AgentConfig,
    /// Chat pipeline shared by every session.
    pub pipeline: ChatPipeline,
    /// Feedback log.
    pub feedback: FeedbackLog,
    /// Locks of sessions with a request in flight; a session runs one turn
    /// at a time.
    pub session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: AgentConfig, pipeline: ChatPipeline) -> Arc<Self> {
        Arc::new(Self {
            feedback: FeedbackLog::new(config.storage.sessions_dir.clone()),
            config,
            pipeline,
            session_locks: DashMap::new(),
        })
    }

    /// File-backed conversation store for `session_id`.
    #[must_use]
    pub fn store(&self, session_id: SessionId) -> ConversationStore {
        let storage = &self.config.storage;
        ConversationStore::open(&storage.sessions_dir, session_id, storage.greeting.clone())
    }

    /// Wait for exclusive access to `session_id`.
    ///
    /// The lock entry is dropped from the map once the last holder releases it.
    pub async fn lock_session(&self, session_id: &SessionId) -> SessionGuard<'_> {
        let lock = self.session_locks.entry(session_id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            locks: &self.session_locks,
            session_id: session_id.clone(),
            guard: Some(guard),
        }
    }
}

/// Exclusive access to one session, released on drop.
pub struct SessionGuard<'a> {
    locks: &'a DashMap<SessionId, Arc<Mutex<()>>>,
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
