//! Client for endpoints speaking the OpenAI chat-completions protocol.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::config::{DEFAULT_OPENAI_BASE_URL, LlmConfig};
use crate::common::errors::{AgentError, AgentResult};
use crate::llm::completion::{
    CompletionFuture, CompletionRequest, TextCompletion, apply_stop,
};

/// Connection timeout for the completion endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Completion client for OpenAI-compatible endpoints.
pub struct OpenAiCompatible {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OpenAiCompatible {
    /// Create a client from the completion config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{base}/chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        for message in &request.history {
            messages.push(WireMessage {
                role: message.role.as_str(),
                content: &message.content,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.user,
        });

        ChatCompletionBody {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: &request.stop,
        }
    }
}

impl TextCompletion for OpenAiCompatible {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> CompletionFuture<'a, AgentResult<String>> {
        Box::pin(async move {
            let mut builder = self.client.post(&self.endpoint).json(&self.body(request));
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            debug!(
                "Completion request to {} ({} history messages)",
                self.endpoint,
                request.history.len()
            );
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(AgentError::Completion(format!(
                    "status {}: {detail}",
                    status.as_u16()
                )));
            }

            let parsed: ChatCompletionResponse = response.json().await?;
            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| AgentError::Completion("response without content".to_string()))?;

            Ok(apply_stop(&text, &request.stop))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::completion::ChatMessage;

    #[test]
    fn test_body_orders_messages() {
        let mut config = LlmConfig::default();
        config.base_url = Some("http://localhost:8000/v1/".to_string());
        let client = OpenAiCompatible::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8000/v1/chat/completions");

        let request = CompletionRequest::new("sys", "now")
            .with_history(vec![ChatMessage::user("before"), ChatMessage::assistant("reply")])
            .with_stop("\nAnswer:");
        let body = serde_json::to_value(client.body(&request)).unwrap();

        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["stop"][0], "\nAnswer:");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_body_omits_empty_stop() {
        let client = OpenAiCompatible::new(&LlmConfig::default()).unwrap();
        let request = CompletionRequest::new("sys", "hi");
        let body = serde_json::to_value(client.body(&request)).unwrap();
        assert!(body.get("stop").is_none());
        assert_eq!(body["model"], "gpt-4-turbo");
    }
}
