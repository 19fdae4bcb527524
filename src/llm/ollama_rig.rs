//! Ollama completion through Rig.
//!
//! Rig's request builder takes a single prompt, so prior turns are folded into
//! a transcript block ahead of the current message.

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::common::config::LlmConfig;
use crate::common::errors::{AgentError, AgentResult};
use crate::llm::completion::{
    ChatMessage, ChatRole, CompletionFuture, CompletionRequest, TextCompletion, apply_stop,
};

/// Ollama-backed completion client.
pub struct OllamaCompletion {
    model: ollama::CompletionModel,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OllamaCompletion {
    /// Create a new client from the completion config.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(config: &LlmConfig) -> AgentResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(AgentError::from)?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl TextCompletion for OllamaCompletion {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> CompletionFuture<'a, AgentResult<String>> {
        Box::pin(async move {
            let prompt = fold_history(&request.history, &request.user);
            debug!("Ollama completion with {} prior messages", request.history.len());

            let built = self
                .model
                .completion_request(prompt)
                .preamble(request.system.clone())
                .temperature(self.temperature)
                .max_tokens_opt(self.max_tokens)
                .build();

            let response = self.model.completion(built).await?;
            let text = extract_text(&response.choice);
            Ok(apply_stop(&text, &request.stop))
        })
    }
}

/// Fold prior turns and the current message into one prompt.
fn fold_history(history: &[ChatMessage], user: &str) -> String {
    if history.is_empty() {
        return user.to_string();
    }

    let mut out = String::from("Conversation so far:\n");
    for message in history {
        let speaker = match message.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out.push_str("\nUser: ");
    out.push_str(user);
    out
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
