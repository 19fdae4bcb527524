//! Turn orchestration.
//!
//! Per user turn: read prompt history, record the user turn, run the intent
//! router and the display-format classifier concurrently, run the lookup if
//! the router asked for one, present the outcome and record the reply.
//! Failures stay inside the turn and come back as `Error: ...` text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::common::config::AgentConfig;
use crate::common::errors::{AgentError, AgentResult};
use crate::conversation::ConversationStore;
use crate::database::DocumentDatabase;
use crate::llm::{ChatMessage, TextCompletion};
use crate::pipeline::delegate::RemoteToolDelegate;
use crate::pipeline::display::FormatClassifier;
use crate::pipeline::presenter::{AssistantReply, PresentationRouter, TurnOutcome};
use crate::pipeline::router::{ChatDecision, IntentRouter};
use crate::pipeline::selector::CollectionSelector;
use crate::pipeline::synthesizer::QuerySynthesizer;
use crate::query::{QueryExecutor, StagePolicy, TabularResult};
use crate::schema::SchemaSource;

/// In-process lookup: describe, select, synthesize, parse, execute.
pub struct LocalLookup {
    schema: SchemaSource,
    selector: Option<CollectionSelector>,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    top_k: usize,
}

impl LocalLookup {
    /// Assemble a lookup; without a selector the question goes straight to
    /// synthesis.
    #[must_use]
    pub const fn new(
        schema: SchemaSource,
        selector: Option<CollectionSelector>,
        synthesizer: QuerySynthesizer,
        executor: QueryExecutor,
        top_k: usize,
    ) -> Self {
        Self {
            schema,
            selector,
            synthesizer,
            executor,
            top_k,
        }
    }

    /// Answer `message` with a table.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be described or a completion
    /// call fails. Query problems yield an empty table instead.
    pub async fn lookup(&self, message: &str) -> AgentResult<TabularResult> {
        let schema = self.schema.describe().await?;

        let question = match &self.selector {
            Some(selector) => {
                let hint = selector.select(message, &schema.text, self.top_k).await?;
                if hint.is_empty() {
                    message.to_string()
                } else {
                    format!("{message}\nRelevant collections: {hint}")
                }
            }
            None => message.to_string(),
        };

        let raw = self.synthesizer.synthesize(&question, &schema.text).await?;
        Ok(self.executor.execute_raw(&raw, &schema).await)
    }
}

/// Where database lookups run.
pub enum ToolBackend {
    /// In this process against the configured database.
    Local(LocalLookup),
    /// On an external service.
    Remote(RemoteToolDelegate),
}

impl ToolBackend {
    async fn run(&self, message: &str) -> AgentResult<TabularResult> {
        match self {
            Self::Local(lookup) => lookup.lookup(message).await,
            Self::Remote(delegate) => delegate.fetch(message).await,
        }
    }
}

/// The full chat pipeline, shared by every session.
pub struct ChatPipeline {
    router: IntentRouter,
    classifier: FormatClassifier,
    presenter: PresentationRouter,
    tools: ToolBackend,
}

impl ChatPipeline {
    /// Pipeline using `completion` for every model call.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>, tools: ToolBackend) -> Self {
        Self {
            router: IntentRouter::new(completion.clone()),
            classifier: FormatClassifier::new(completion.clone()),
            presenter: PresentationRouter::new(completion),
            tools,
        }
    }

    /// Wire the pipeline from configuration.
    ///
    /// `database` may be `None` only when lookups are delegated.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be built or no database is
    /// available for in-process lookups.
    pub fn from_config(
        config: &AgentConfig,
        completion: Arc<dyn TextCompletion>,
        database: Option<Arc<dyn DocumentDatabase>>,
    ) -> AgentResult<Self> {
        let tools = if let Some(endpoint) = &config.tool.delegate_endpoint {
            info!("Database lookups delegated to {endpoint}");
            ToolBackend::Remote(RemoteToolDelegate::new(
                endpoint.clone(),
                Duration::from_secs(config.llm.timeout_seconds),
            )?)
        } else {
            let database = database.ok_or_else(|| {
                AgentError::InvalidConfig("a database is required for in-process lookups".to_string())
            })?;
            let pipeline = &config.pipeline;
            let selector = pipeline
                .select_collections
                .then(|| CollectionSelector::new(completion.clone()));
            let synthesizer = QuerySynthesizer::new(completion.clone(), pipeline.default_limit)
                .with_question_suffix(pipeline.question_suffix.clone());
            let executor = QueryExecutor::new(
                database.clone(),
                StagePolicy::from_switch(pipeline.enforce_read_only),
            );
            ToolBackend::Local(LocalLookup::new(
                SchemaSource::from_config(config, database)?,
                selector,
                synthesizer,
                executor,
                pipeline.top_k,
            ))
        };
        Ok(Self::new(completion, tools))
    }

    /// Schema source of the in-process lookup; `None` when lookups are delegated.
    #[must_use]
    pub const fn schema(&self) -> Option<&SchemaSource> {
        match &self.tools {
            ToolBackend::Local(lookup) => Some(&lookup.schema),
            ToolBackend::Remote(_) => None,
        }
    }

    /// Answer one turn without touching storage.
    ///
    /// # Errors
    /// Returns an error if routing, the lookup or summarisation fails.
    pub async fn answer(&self, input: &str, history: &[ChatMessage]) -> AgentResult<AssistantReply> {
        let (decision, hint) = tokio::join!(
            self.router.route(input, history),
            self.classifier.classify(input)
        );

        let outcome = match decision? {
            ChatDecision::ToolCall { name, message } => {
                info!("Running tool {name}");
                TurnOutcome::Fetched(self.tools.run(&message).await?)
            }
            ChatDecision::DirectReply { text } => TurnOutcome::Direct(text),
        };
        self.presenter.present(hint, outcome).await
    }

    /// Answer one turn and record it in `store`.
    pub async fn respond(&self, store: &ConversationStore, input: &str) -> AssistantReply {
        let history = store.prompt_history().await;
        if let Err(e) = store.add_user_text(input).await {
            warn!("Failed to record user turn for {}: {e}", store.session_id());
        }

        let reply = match self.answer(input, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Turn failed for {}: {e}", store.session_id());
                AssistantReply::Text(format!("Error: {e}"))
            }
        };

        if let Err(e) = store.add_reply(&reply).await {
            warn!("Failed to record assistant turn for {}: {e}", store.session_id());
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::conversation::{Turn, TurnKind};
    use crate::database::CollectionMetadata;
    use crate::testing::{InMemoryDatabase, ScriptedCompletion};

    const ROUTER: &str = "These are the available tools";
    const DISPLAY: &str = "output_format";
    const SELECTOR: &str = "MongoDBCollections";
    const SYNTHESIS: &str = "list of pipeline stages";
    const SUMMARY: &str = "Read data";

    fn tickets_db(results: Vec<Value>) -> Arc<InMemoryDatabase> {
        Arc::new(
            InMemoryDatabase::new()
                .with_collection(CollectionMetadata {
                    name: "tickets".to_string(),
                    samples: vec![json!({"subject": "Refund", "sentiment": "negative"})],
                    ..CollectionMetadata::default()
                })
                .with_result("tickets", results),
        )
    }

    fn pipeline(completion: Arc<ScriptedCompletion>, db: Arc<InMemoryDatabase>) -> ChatPipeline {
        ChatPipeline::from_config(&AgentConfig::default(), completion, Some(db as Arc<dyn DocumentDatabase>)).unwrap()
    }

    fn store() -> ConversationStore {
        ConversationStore::in_memory("e2e".parse().unwrap(), "How can I help you?")
    }

    #[tokio::test]
    async fn test_count_question_is_summarised() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .on(ROUTER, r#"{"tool_name": "db_data", "user_message": "how many tickets are there?"}"#)
                .on(DISPLAY, r#"{"output_format": "text"}"#)
                .on(SELECTOR, "MongoDBCollections: \"tickets\"")
                .on(SYNTHESIS, r#"{"collection": "tickets", "pipeline": [{"$count": "total_tickets"}]}"#)
                .on(SUMMARY, "There are 42 tickets in total."),
        );
        let db = tickets_db(vec![json!({"total_tickets": 42})]);
        let chat = pipeline(completion.clone(), db.clone());
        let store = store();

        let reply = chat.respond(&store, "how many tickets are there?").await;
        match &reply {
            AssistantReply::Text(text) => assert!(text.contains("42")),
            AssistantReply::Table(_) => panic!("expected a sentence"),
        }
        assert_eq!(db.aggregations(), vec!["tickets".to_string()]);

        let turns = store.messages().await;
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], Turn::user("how many tickets are there?"));
        assert_eq!(turns[2], Turn::assistant("There are 42 tickets in total."));

        let synthesis = completion
            .requests()
            .into_iter()
            .find(|r| r.system.contains(SYNTHESIS))
            .unwrap();
        assert!(synthesis.user.contains("Collection Name: tickets"));
        assert!(synthesis.user.contains("Relevant collections: MongoDBCollections: \"tickets\""));
    }

    #[tokio::test]
    async fn test_table_question_returns_table_unmodified() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .on(ROUTER, r#"{"tool_name": "db_data", "user_message": "show me tickets with negative sentiment"}"#)
                .on(DISPLAY, r#"{"output_format": "table"}"#)
                .on(SELECTOR, "\"tickets\"")
                .on(
                    SYNTHESIS,
                    "{'collection': 'tickets', 'pipeline': [{'$match': {'sentiment': 'negative'}}, {'$project': {'subject': 1, 'date': 1}}, {'$limit': 10}]}",
                ),
        );
        let db = tickets_db(vec![
            json!({"_id": "a1", "subject": "Refund late", "date": "2024-03-01T00:00:00.000Z"}),
            json!({"_id": "b2", "subject": "Login broken", "date": "2024-03-02T00:00:00.000Z"}),
        ]);
        let chat = pipeline(completion.clone(), db);
        let store = store();

        let reply = chat.respond(&store, "show me tickets with negative sentiment").await;
        let AssistantReply::Table(table) = reply else {
            panic!("expected a table");
        };
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().to_vec(), vec!["Id", "Subject", "Date"]);
        assert!(completion.requests().iter().all(|r| !r.system.contains(SUMMARY)));

        let turns = store.messages().await;
        assert_eq!(turns[2].kind(), TurnKind::Tabular);
        assert_eq!(store.payload_count().await, 1);
    }

    #[tokio::test]
    async fn test_chat_reply_passes_through() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .on(ROUTER, "Hello! Ask me anything about your tickets.")
                .on(DISPLAY, r#"{"output_format": "table"}"#),
        );
        let db = tickets_db(Vec::new());
        let chat = pipeline(completion, db.clone());

        let reply = chat.answer("hi", &[]).await.unwrap();
        assert_eq!(
            reply,
            AssistantReply::Text("Hello! Ask me anything about your tickets.".to_string())
        );
        assert!(db.aggregations().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_query_gives_empty_table() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .on(ROUTER, r#"{"tool_name": "db_data", "user_message": "tickets"}"#)
                .on(DISPLAY, r#"{"output_format": "table"}"#)
                .on(SELECTOR, "\"tickets\"")
                .on(SYNTHESIS, "Sorry, I cannot help with that."),
        );
        let db = tickets_db(vec![json!({"subject": "x"})]);
        let chat = pipeline(completion, db.clone());

        let reply = chat.answer("tickets", &[]).await.unwrap();
        assert_eq!(reply, AssistantReply::Table(TabularResult::empty()));
        assert!(db.aggregations().is_empty());
    }

    #[test]
    fn test_local_lookups_need_a_database() {
        let completion = Arc::new(ScriptedCompletion::new());
        let result = ChatPipeline::from_config(&AgentConfig::default(), completion.clone(), None);
        assert!(matches!(result, Err(AgentError::InvalidConfig(_))));

        let mut config = AgentConfig::default();
        config.tool.delegate_endpoint = Some("http://localhost:9/tool".to_string());
        let delegated = ChatPipeline::from_config(&config, completion, None).unwrap();
        assert!(delegated.schema().is_none());
    }

    #[tokio::test]
    async fn test_turn_failure_becomes_error_text() {
        let completion = Arc::new(ScriptedCompletion::new().on(DISPLAY, r#"{"output_format": "text"}"#));
        let chat = pipeline(completion, tickets_db(Vec::new()));
        let store = store();

        let reply = chat.respond(&store, "hello?").await;
        let AssistantReply::Text(text) = reply else {
            panic!("expected error text");
        };
        assert!(text.starts_with("Error: "));
        assert_eq!(store.messages().await.len(), 3);
    }

    #[tokio::test]
    async fn test_history_excludes_current_turn() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .on(ROUTER, "Sure.")
                .on(DISPLAY, r#"{"output_format": "text"}"#),
        );
        let chat = pipeline(completion.clone(), tickets_db(Vec::new()));
        let store = store();

        chat.respond(&store, "first").await;
        chat.respond(&store, "second").await;

        let routed: Vec<_> = completion
            .requests()
            .into_iter()
            .filter(|r| r.system.contains(ROUTER))
            .collect();
        assert_eq!(routed[1].user, "second");
        assert_eq!(
            routed[1].history,
            vec![
                ChatMessage::assistant("How can I help you?"),
                ChatMessage::user("first"),
                ChatMessage::assistant("Sure.")
            ]
        );
    }
}
