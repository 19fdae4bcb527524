//! Text-completion seam used by every pipeline stage.
//!
//! The pipeline only ever needs "system instruction + history + user message
//! in, text out". Providers implement [`TextCompletion`]; everything above
//! this module is provider-agnostic.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::common::errors::AgentResult;

/// Boxed future type for completion calls.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Speaker of a prior message in the prompt history.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// End user.
    User,
    /// The assistant.
    Assistant,
}

impl ChatRole {
    /// Stable string form used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One prior message handed to the model.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,
    /// Prior conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// Current user message.
    pub user: String,
    /// Generation stops at the first of these sequences.
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Start a request with a system instruction and user message.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: Vec::new(),
            user: user.into(),
            stop: Vec::new(),
        }
    }

    /// Attach prior conversation.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Attach a stop sequence.
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// Opaque text-completion service.
pub trait TextCompletion: Send + Sync {
    /// Complete a request and return the raw model text.
    ///
    /// # Errors
    /// Returns an error if the provider cannot be reached or answers with an
    /// unusable body.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> CompletionFuture<'a, AgentResult<String>>;
}

/// Cut `text` at the earliest stop sequence.
///
/// Providers may ignore the stop hint, so this is applied to every response.
#[must_use]
pub fn apply_stop(text: &str, stop: &[String]) -> String {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].to_string()
}
