//! Session-scoped conversation store.
//!
//! Lifecycle: empty → greeting seeded on first read → user/assistant turns
//! accumulate → `clear()` empties everything and the next read seeds the
//! greeting again. Every append rewrites the whole turn log.
//!
//! `resolved_messages()` shows the greeting without storing it, so display
//! reads never write.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::common::errors::AgentResult;
use crate::common::ids::{PayloadId, SessionId};
use crate::conversation::backend::{
    FileHistoryBackend, HistoryBackend, MemoryHistoryBackend, PayloadMap,
};
use crate::conversation::turn::{Role, Turn, TurnContent};
use crate::llm::ChatMessage;
use crate::pipeline::presenter::AssistantReply;
use crate::pipeline::prompts::DB_TOOL_NAME;
use crate::query::TabularResult;

/// Marker key of an internal tool-call directive.
const TOOL_DIRECTIVE_MARKER: &str = "tool_name";

/// A turn with its table resolved, ready for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayMessage {
    /// Speaker.
    pub role: Role,
    /// Text or table.
    #[serde(flatten)]
    pub reply: AssistantReply,
}

/// Ordered turn log and tabular payload map of one session.
pub struct ConversationStore {
    session_id: SessionId,
    backend: Box<dyn HistoryBackend>,
    greeting: String,
}

impl ConversationStore {
    /// Store over an arbitrary backend.
    #[must_use]
    pub fn new(session_id: SessionId, backend: Box<dyn HistoryBackend>, greeting: impl Into<String>) -> Self {
        Self {
            session_id,
            backend,
            greeting: greeting.into(),
        }
    }

    /// File-backed store under `<sessions_dir>/<session_id>/`.
    #[must_use]
    pub fn open(sessions_dir: &Path, session_id: SessionId, greeting: impl Into<String>) -> Self {
        let backend = FileHistoryBackend::new(sessions_dir, &session_id);
        Self::new(session_id, Box::new(backend), greeting)
    }

    /// Store that lives only in memory.
    #[must_use]
    pub fn in_memory(session_id: SessionId, greeting: impl Into<String>) -> Self {
        Self::new(session_id, Box::new(MemoryHistoryBackend::new()), greeting)
    }

    /// Session this store belongs to.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Turn log, seeding the greeting when it is empty.
    pub async fn messages(&self) -> Vec<Turn> {
        let turns = self.backend.load_turns().await;
        if !turns.is_empty() {
            return turns;
        }

        let seeded = vec![Turn::assistant(self.greeting.clone())];
        if let Err(e) = self.backend.save_turns(&seeded).await {
            warn!("Failed to persist greeting for {}: {e}", self.session_id);
        }
        seeded
    }

    /// Stored turns, or the greeting alone when none are stored; writes nothing.
    async fn snapshot(&self) -> Vec<Turn> {
        let turns = self.backend.load_turns().await;
        if turns.is_empty() {
            vec![Turn::assistant(self.greeting.clone())]
        } else {
            turns
        }
    }

    /// Tabular payload map: id → serialized table.
    pub async fn json_messages(&self) -> PayloadMap {
        self.backend.load_payloads().await
    }

    /// Append a user text turn.
    ///
    /// # Errors
    /// Returns an error if the turn log cannot be written.
    pub async fn add_user_text(&self, text: &str) -> AgentResult<()> {
        self.append(Turn::user(text)).await
    }

    /// Append an assistant text turn.
    ///
    /// # Errors
    /// Returns an error if the turn log cannot be written.
    pub async fn add_assistant_text(&self, text: &str) -> AgentResult<()> {
        self.append(Turn::assistant(text)).await
    }

    /// Store `table` under a fresh id and append a turn referencing it.
    ///
    /// # Errors
    /// Returns an error if the payload map or the turn log cannot be written.
    pub async fn add_assistant_table(&self, table: &TabularResult) -> AgentResult<PayloadId> {
        let id = PayloadId::new();
        let mut payloads = self.backend.load_payloads().await;
        payloads.insert(id.as_str().to_string(), serde_json::to_value(table)?);
        self.backend.save_payloads(&payloads).await?;

        self.append(Turn::tabular(id.clone())).await?;
        Ok(id)
    }

    /// Append an assistant reply of either kind.
    ///
    /// # Errors
    /// Returns an error if storage cannot be written.
    pub async fn add_reply(&self, reply: &AssistantReply) -> AgentResult<()> {
        match reply {
            AssistantReply::Text(text) => self.add_assistant_text(text).await,
            AssistantReply::Table(table) => self.add_assistant_table(table).await.map(|_| ()),
        }
    }

    /// Table stored under `id`.
    pub async fn resolve(&self, id: &PayloadId) -> Option<TabularResult> {
        let payloads = self.backend.load_payloads().await;
        let value = payloads.get(id.as_str())?.clone();
        serde_json::from_value(value)
            .map_err(|e| warn!("Stored table {id} is unreadable: {e}"))
            .ok()
    }

    /// Turns with tables resolved, for display.
    pub async fn resolved_messages(&self) -> Vec<DisplayMessage> {
        let turns = self.snapshot().await;
        let payloads = self.backend.load_payloads().await;
        turns
            .into_iter()
            .map(|turn| {
                let reply = match turn.content {
                    TurnContent::Text(text) => AssistantReply::Text(text),
                    TurnContent::Tabular(id) => payloads
                        .get(id.as_str())
                        .and_then(|value| serde_json::from_value(value.clone()).ok())
                        .map_or_else(
                            || AssistantReply::Text(format!("[table {id} unavailable]")),
                            AssistantReply::Table,
                        ),
                };
                DisplayMessage {
                    role: turn.role,
                    reply,
                }
            })
            .collect()
    }

    /// Text turns as prompt history; tabular turns are left out.
    pub async fn prompt_history(&self) -> Vec<ChatMessage> {
        self.messages()
            .await
            .into_iter()
            .filter_map(|turn| {
                let text = turn.text()?.to_string();
                Some(match turn.role {
                    Role::User => ChatMessage::user(text),
                    Role::Assistant => ChatMessage::assistant(text),
                })
            })
            .collect()
    }

    /// Drop every turn and stored table.
    ///
    /// # Errors
    /// Returns an error if storage cannot be written.
    pub async fn clear(&self) -> AgentResult<()> {
        self.backend.save_turns(&[]).await?;
        self.backend.save_payloads(&PayloadMap::new()).await?;
        debug!("Cleared conversation {}", self.session_id);
        Ok(())
    }

    /// Stored turns, without seeding.
    pub async fn turn_count(&self) -> usize {
        self.backend.load_turns().await.len()
    }

    /// Stored tables, without seeding.
    pub async fn payload_count(&self) -> usize {
        self.backend.load_payloads().await.len()
    }

    async fn append(&self, turn: Turn) -> AgentResult<()> {
        if turn.text().is_some_and(is_tool_directive) {
            debug!("Dropping tool directive from {} history", self.session_id);
            return Ok(());
        }
        let mut turns = self.backend.load_turns().await;
        turns.push(turn);
        self.backend.save_turns(&turns).await
    }
}

/// Whether `text` is an internal routing directive rather than conversation.
#[must_use]
pub fn is_tool_directive(text: &str) -> bool {
    text.contains(TOOL_DIRECTIVE_MARKER) && text.contains(DB_TOOL_NAME)
}
