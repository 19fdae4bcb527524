//! Text-completion providers.

pub mod completion;
pub mod ollama_rig;
pub mod openai_compat;

pub use completion::{
    ChatMessage, ChatRole, CompletionFuture, CompletionRequest, TextCompletion, apply_stop,
};
pub use ollama_rig::OllamaCompletion;
pub use openai_compat::OpenAiCompatible;

use std::sync::Arc;

use crate::common::config::{LlmConfig, LlmProvider};
use crate::common::errors::AgentResult;

/// Build the configured completion provider.
///
/// # Errors
/// Returns an error if the provider client cannot be built.
pub fn build_completion(config: &LlmConfig) -> AgentResult<Arc<dyn TextCompletion>> {
    Ok(match config.provider {
        LlmProvider::OpenAiCompatible => Arc::new(OpenAiCompatible::new(config)?),
        LlmProvider::Ollama => Arc::new(OllamaCompletion::new(config)?),
    })
}
