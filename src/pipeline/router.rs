//! Intent routing: database lookup or direct reply.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::common::errors::AgentResult;
use crate::llm::{ChatMessage, CompletionRequest, TextCompletion};
use crate::pipeline::prompts::{DB_TOOL_NAME, ROUTER_SYSTEM};
use crate::query::{parse_literal, strip_code_fences};

/// What the router decided for one user turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ChatDecision {
    /// Run the named tool with `message`.
    ToolCall {
        /// Tool name.
        name: String,
        /// Message handed to the tool.
        message: String,
    },
    /// Reply to the user with `text` as-is.
    DirectReply {
        /// Reply text.
        text: String,
    },
}

impl ChatDecision {
    /// Interpret router output.
    ///
    /// Only an object naming the database tool with a string `user_message`
    /// is a tool call; anything else is passed through unchanged.
    #[must_use]
    pub fn from_completion(raw: &str) -> Self {
        let unfenced = strip_code_fences(raw);
        if let Ok(Value::Object(map)) = parse_literal(unfenced.trim()) {
            let tool = map.get("tool_name").and_then(Value::as_str);
            let message = map.get("user_message").and_then(Value::as_str);
            if let (Some(DB_TOOL_NAME), Some(message)) = (tool, message) {
                return Self::ToolCall {
                    name: DB_TOOL_NAME.to_string(),
                    message: message.to_string(),
                };
            }
        }
        Self::DirectReply {
            text: raw.to_string(),
        }
    }

    /// Whether a tool must run.
    #[must_use]
    pub const fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// Decides whether a turn needs a database lookup.
pub struct IntentRouter {
    completion: Arc<dyn TextCompletion>,
}

impl IntentRouter {
    /// Router backed by `completion`.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Route `input` given the prior conversation.
    ///
    /// # Errors
    /// Returns an error only if the completion call fails.
    pub async fn route(&self, input: &str, history: &[ChatMessage]) -> AgentResult<ChatDecision> {
        let request = CompletionRequest::new(ROUTER_SYSTEM, input).with_history(history.to_vec());
        let raw = self.completion.complete(&request).await?;
        let decision = ChatDecision::from_completion(&raw);
        debug!("Router decision: {decision:?}");
        Ok(decision)
    }
}
