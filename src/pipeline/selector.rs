//! Collection selection ahead of query synthesis.
//!
//! The answer is advisory free text. It is not checked against the schema
//! here; the executor enforces the schema on the final query instead.

use std::sync::Arc;

use tracing::debug;

use crate::common::errors::AgentResult;
use crate::llm::{CompletionRequest, TextCompletion};
use crate::pipeline::prompts::{SELECTOR_STOP, selector_system, selector_user};

/// Suggests which collections a question needs.
pub struct CollectionSelector {
    completion: Arc<dyn TextCompletion>,
}

impl CollectionSelector {
    /// Selector backed by `completion`.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Suggest at most `max_results` collections from `schema`.
    ///
    /// # Errors
    /// Returns an error if the completion call fails.
    pub async fn select(&self, question: &str, schema: &str, max_results: usize) -> AgentResult<String> {
        let request = CompletionRequest::new(selector_system(max_results), selector_user(question, schema))
            .with_stop(SELECTOR_STOP);
        let raw = self.completion.complete(&request).await?;
        let suggestion = raw.trim().to_string();
        debug!("Collection selector suggested: {suggestion}");
        Ok(suggestion)
    }
}
