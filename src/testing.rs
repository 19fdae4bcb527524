//! Test doubles for the completion and database seams.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::common::errors::{AgentError, AgentResult};
use crate::database::{CollectionMetadata, DbFuture, DocumentDatabase, Stage};
use crate::llm::{CompletionFuture, CompletionRequest, TextCompletion};

/// Completion that answers by matching a needle in the system prompt.
pub struct ScriptedCompletion {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer `reply` when the system prompt contains `needle`.
    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Answer `reply` when no rule matches; otherwise unmatched calls fail.
    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TextCompletion for ScriptedCompletion {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> CompletionFuture<'a, AgentResult<String>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            self.rules
                .iter()
                .find(|(needle, _)| request.system.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .or_else(|| self.fallback.clone())
                .ok_or_else(|| AgentError::Completion("no scripted reply".to_string()))
        })
    }
}

/// Database holding fixed metadata and canned aggregation results.
pub struct InMemoryDatabase {
    collections: BTreeMap<String, CollectionMetadata>,
    results: BTreeMap<String, Vec<Value>>,
    aggregations: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            results: BTreeMap::new(),
            aggregations: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_collection(mut self, metadata: CollectionMetadata) -> Self {
        self.collections.insert(metadata.name.clone(), metadata);
        self
    }

    /// Documents returned by any aggregation on `collection`.
    pub fn with_result(mut self, collection: &str, documents: Vec<Value>) -> Self {
        self.results.insert(collection.to_string(), documents);
        self
    }

    /// Make every later aggregation fail.
    pub fn fail_aggregations(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Collections aggregated so far, in call order.
    pub fn aggregations(&self) -> Vec<String> {
        self.aggregations.lock().unwrap().clone()
    }
}

impl DocumentDatabase for InMemoryDatabase {
    fn list_collection_names(&self) -> DbFuture<'_, AgentResult<Vec<String>>> {
        Box::pin(async move { Ok(self.collections.keys().cloned().collect()) })
    }

    fn describe_collection<'a>(
        &'a self,
        name: &'a str,
    ) -> DbFuture<'a, AgentResult<CollectionMetadata>> {
        Box::pin(async move {
            self.collections
                .get(name)
                .cloned()
                .ok_or_else(|| AgentError::InvalidConfig(format!("no collection {name}")))
        })
    }

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        _pipeline: &'a [Stage],
    ) -> DbFuture<'a, AgentResult<Vec<Value>>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AgentError::Bson("aggregation failed".to_string()));
            }
            self.aggregations
                .lock()
                .unwrap()
                .push(collection.to_string());
            Ok(self.results.get(collection).cloned().unwrap_or_default())
        })
    }
}
