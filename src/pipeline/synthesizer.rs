//! Query synthesis: question plus schema in, raw candidate query text out.

use std::sync::Arc;

use tracing::debug;

use crate::common::errors::AgentResult;
use crate::llm::{CompletionRequest, TextCompletion};
use crate::pipeline::prompts::{SYNTHESIS_STOP, synthesis_system, synthesis_user};

/// Produces MongoDB candidate queries as raw text.
pub struct QuerySynthesizer {
    completion: Arc<dyn TextCompletion>,
    default_limit: usize,
    question_suffix: Option<String>,
}

impl QuerySynthesizer {
    /// Synthesizer capping unbounded questions at `default_limit` results.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>, default_limit: usize) -> Self {
        Self {
            completion,
            default_limit,
            question_suffix: None,
        }
    }

    /// Append `suffix` on its own line to every question.
    #[must_use]
    pub fn with_question_suffix(mut self, suffix: Option<String>) -> Self {
        self.question_suffix = suffix.filter(|s| !s.trim().is_empty());
        self
    }

    /// Generate a candidate query for `question` grounded in `schema`.
    ///
    /// Malformed output is returned as-is; the output parser deals with it.
    ///
    /// # Errors
    /// Returns an error if the completion call fails.
    pub async fn synthesize(&self, question: &str, schema: &str) -> AgentResult<String> {
        let question = match &self.question_suffix {
            Some(suffix) => format!("{question}\n{suffix}"),
            None => question.to_string(),
        };
        let request = CompletionRequest::new(
            synthesis_system(self.default_limit),
            synthesis_user(&question, schema),
        )
        .with_stop(SYNTHESIS_STOP);

        let raw = self.completion.complete(&request).await?;
        debug!("Synthesizer output: {raw}");
        Ok(raw.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    #[tokio::test]
    async fn test_synthesize_appends_suffix() {
        let completion = Arc::new(ScriptedCompletion::new().otherwise(
            "\n{\"collection\": \"tickets\", \"pipeline\": [{\"$count\": \"total\"}]}\n",
        ));
        let synthesizer = QuerySynthesizer::new(completion.clone(), 10)
            .with_question_suffix(Some("NOTE: include the ticket subject".to_string()));

        let raw = synthesizer
            .synthesize("how many tickets?", "Collection Name: tickets")
            .await
            .unwrap();
        assert!(raw.starts_with('{'));

        let request = &completion.requests()[0];
        assert!(request.user.ends_with("how many tickets?\nNOTE: include the ticket subject"));
        assert!(request.system.contains("{\"$limit\": 10}"));
        assert_eq!(request.stop, vec![SYNTHESIS_STOP.to_string()]);
    }

    #[tokio::test]
    async fn test_blank_suffix_is_ignored() {
        let completion = Arc::new(ScriptedCompletion::new().otherwise("{}"));
        let synthesizer =
            QuerySynthesizer::new(completion.clone(), 5).with_question_suffix(Some("  ".to_string()));
        synthesizer.synthesize("q", "s").await.unwrap();
        assert!(completion.requests()[0].user.ends_with("Question: q"));
    }
}
