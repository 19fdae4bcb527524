//! Runs parsed queries and flattens the documents they return.

use std::sync::Arc;

use tracing::{info, warn};

use crate::database::DocumentDatabase;
use crate::query::guard::StagePolicy;
use crate::query::parser::{CandidateQuery, parse_candidate};
use crate::query::tabular::TabularResult;
use crate::schema::SchemaDescription;

/// Executes candidate queries against the document database.
///
/// Failures never leave this type: unknown collections, refused stages and
/// driver errors are logged and produce an empty result.
pub struct QueryExecutor {
    database: Arc<dyn DocumentDatabase>,
    policy: StagePolicy,
}

impl QueryExecutor {
    /// Build an executor with the given stage policy.
    #[must_use]
    pub fn new(database: Arc<dyn DocumentDatabase>, policy: StagePolicy) -> Self {
        Self { database, policy }
    }

    /// Run `query`, which must target a collection named by `schema`.
    pub async fn execute(&self, query: &CandidateQuery, schema: &SchemaDescription) -> TabularResult {
        if !schema.contains(&query.collection) {
            warn!(
                "Generated query targets undescribed collection {}",
                query.collection
            );
            return TabularResult::empty();
        }
        if let Err(violation) = self.policy.check(&query.pipeline, schema) {
            warn!("Refusing pipeline on {}: {violation}", query.collection);
            return TabularResult::empty();
        }

        match self.database.aggregate(&query.collection, &query.pipeline).await {
            Ok(documents) => {
                info!(
                    "Aggregation on {} returned {} documents",
                    query.collection,
                    documents.len()
                );
                TabularResult::from_documents(&documents)
            }
            Err(e) => {
                warn!("Aggregation on {} failed: {e}", query.collection);
                TabularResult::empty()
            }
        }
    }

    /// Parse raw generator output and run it; unparseable output runs nothing.
    pub async fn execute_raw(&self, raw: &str, schema: &SchemaDescription) -> TabularResult {
        match parse_candidate(raw) {
            Some(query) => self.execute(&query, schema).await,
            None => TabularResult::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::CollectionMetadata;
    use crate::testing::InMemoryDatabase;

    fn setup() -> (Arc<InMemoryDatabase>, SchemaDescription) {
        let db = InMemoryDatabase::new()
            .with_collection(CollectionMetadata {
                name: "tickets".to_string(),
                ..CollectionMetadata::default()
            })
            .with_result(
                "tickets",
                vec![json!({"_id": "a1", "subject": "Refund", "account": {"name": "Acme"}})],
            );
        let schema = SchemaDescription {
            text: "Collection Name: tickets".to_string(),
            collections: ["tickets".to_string()].into(),
        };
        (Arc::new(db), schema)
    }

    #[tokio::test]
    async fn test_execute_flattens_results() {
        let (db, schema) = setup();
        let executor = QueryExecutor::new(db.clone(), StagePolicy::default());
        let table = executor
            .execute_raw(r#"{"collection": "tickets", "pipeline": [{"$limit": 10}]}"#, &schema)
            .await;

        assert_eq!(table.columns().to_vec(), vec!["Id", "Subject", "Account Name"]);
        assert_eq!(db.aggregations(), vec!["tickets".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let (db, schema) = setup();
        let executor = QueryExecutor::new(db.clone(), StagePolicy::default());
        let table = executor
            .execute_raw(r#"{"collection": "ticket", "pipeline": [{"$limit": 10}]}"#, &schema)
            .await;

        assert!(table.is_empty());
        assert!(db.aggregations().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_and_refused_are_empty() {
        let (db, schema) = setup();
        let executor = QueryExecutor::new(db.clone(), StagePolicy::read_only());

        assert!(executor.execute_raw("no query here", &schema).await.is_empty());
        let write = r#"{"collection": "tickets", "pipeline": [{"$out": "copy"}]}"#;
        assert!(executor.execute_raw(write, &schema).await.is_empty());
        assert!(db.aggregations().is_empty());

        let permissive = QueryExecutor::new(db.clone(), StagePolicy::permissive());
        assert!(!permissive.execute_raw(write, &schema).await.is_empty());
    }

    #[tokio::test]
    async fn test_driver_errors_are_empty() {
        let (db, schema) = setup();
        db.fail_aggregations();
        let executor = QueryExecutor::new(db, StagePolicy::default());
        let table = executor
            .execute_raw(r#"{"collection": "tickets", "pipeline": [{"$limit": 1}]}"#, &schema)
            .await;
        assert!(table.is_empty());
    }
}
