//! Presentation routing: choose between a sentence and the raw table.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::errors::AgentResult;
use crate::llm::{CompletionRequest, TextCompletion};
use crate::pipeline::display::FormatHint;
use crate::pipeline::prompts::SUMMARY_SYSTEM;
use crate::query::TabularResult;

/// What the turn produced before presentation.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// No tool ran; the router's text is the answer.
    Direct(String),
    /// A tool ran and returned this table.
    Fetched(TabularResult),
}

/// Final assistant output for one turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum AssistantReply {
    /// A sentence.
    Text(String),
    /// A table, unmodified.
    Table(TabularResult),
}

impl AssistantReply {
    /// Plain-text rendering: the sentence, or the table layout.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Table(table) => table.to_text(),
        }
    }
}

/// Turns outcomes into replies, summarising tables when text was asked for.
pub struct PresentationRouter {
    completion: Arc<dyn TextCompletion>,
}

impl PresentationRouter {
    /// Router backed by `completion` for summaries.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Present `outcome` according to `hint`.
    ///
    /// # Errors
    /// Returns an error if the summary completion fails.
    pub async fn present(&self, hint: FormatHint, outcome: TurnOutcome) -> AgentResult<AssistantReply> {
        match (outcome, hint) {
            (TurnOutcome::Direct(text), _) => Ok(AssistantReply::Text(text)),
            (TurnOutcome::Fetched(table), FormatHint::Table) => Ok(AssistantReply::Table(table)),
            (TurnOutcome::Fetched(table), FormatHint::Text) => {
                let request = CompletionRequest::new(SUMMARY_SYSTEM, table.to_text());
                let sentence = self.completion.complete(&request).await?;
                debug!("Summarised {} records", table.len());
                Ok(AssistantReply::Text(sentence.trim().to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedCompletion;

    fn presenter(reply: &str) -> (Arc<ScriptedCompletion>, PresentationRouter) {
        let completion = Arc::new(ScriptedCompletion::new().on("Read data", reply));
        (completion.clone(), PresentationRouter::new(completion))
    }

    #[tokio::test]
    async fn test_direct_text_ignores_hint() {
        let (completion, router) = presenter("unused");
        for hint in [FormatHint::Text, FormatHint::Table] {
            let reply = router
                .present(hint, TurnOutcome::Direct("Hi!".to_string()))
                .await
                .unwrap();
            assert_eq!(reply, AssistantReply::Text("Hi!".to_string()));
        }
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_table_hint_returns_table_unmodified() {
        let (completion, router) = presenter("unused");
        let table = TabularResult::from_documents(&[json!({"subject": "Refund"})]);
        let reply = router
            .present(FormatHint::Table, TurnOutcome::Fetched(table.clone()))
            .await
            .unwrap();
        assert_eq!(reply, AssistantReply::Table(table));
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_text_hint_summarises() {
        let (completion, router) = presenter(" There are 42 tickets. ");
        let table = TabularResult::from_documents(&[json!({"total_tickets": 42})]);
        let reply = router
            .present(FormatHint::Text, TurnOutcome::Fetched(table))
            .await
            .unwrap();
        assert_eq!(reply, AssistantReply::Text("There are 42 tickets.".to_string()));
        assert!(completion.requests()[0].user.contains("42"));
    }

    #[test]
    fn test_reply_serialization() {
        let reply = AssistantReply::Text("ok".to_string());
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"kind": "text", "content": "ok"})
        );
    }
}
