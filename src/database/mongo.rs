//! MongoDB implementation of the document-database collaborator.
//!
//! Besides the three operations the query pipeline consumes, this exposes the
//! direct CRUD helpers. Those never return a driver error: failures come back
//! as an `"Error: ..."` string in place of the result ([`Reported`]).

use std::collections::BTreeSet;

use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::{Client, Collection, Database};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::common::config::DatabaseConfig;
use crate::common::errors::{AgentError, AgentResult};
use crate::database::collaborator::{
    CollectionMetadata, DbFuture, DocumentDatabase, IndexSpec, Stage,
};
use crate::database::convert::{bson_to_json, document_to_json, object_to_document};

/// Outcome of a direct CRUD helper: the value, or a descriptive error string.
pub type Reported<T> = Result<T, String>;

fn report<T, E: std::fmt::Display>(result: Result<T, E>) -> Reported<T> {
    result.map_err(|e| format!("Error: {e}"))
}

/// Wrapper around one MongoDB database.
pub struct MongoDatabase {
    database: Database,
    usable: Vec<String>,
    sample_documents: usize,
}

impl MongoDatabase {
    /// Connect using the configured URI and database name.
    ///
    /// # Errors
    /// Returns an error if the URI is missing, the driver cannot connect, or
    /// the include/ignore lists name unknown collections.
    pub async fn connect(config: &DatabaseConfig) -> AgentResult<Self> {
        let uri = config
            .uri
            .as_deref()
            .ok_or_else(|| AgentError::InvalidConfig("database.uri is not set".to_string()))?;
        let client = Client::with_uri_str(uri).await?;
        let database = match &config.database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                AgentError::InvalidConfig("no database name in config or URI".to_string())
            })?,
        };
        Self::from_database(database, config).await
    }

    /// Wrap an already selected database.
    ///
    /// # Errors
    /// Returns an error if collections cannot be listed or the include/ignore
    /// lists are invalid.
    pub async fn from_database(database: Database, config: &DatabaseConfig) -> AgentResult<Self> {
        let all: BTreeSet<String> = database.list_collection_names().await?.into_iter().collect();
        let usable = usable_collections(
            &all,
            &config.include_collections,
            &config.ignore_collections,
        )?;
        info!(
            "Connected to database {} ({} usable collections)",
            database.name(),
            usable.len()
        );

        Ok(Self {
            database,
            usable,
            sample_documents: config.sample_documents,
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    /// Find documents matching `query`, optionally projected.
    pub async fn find(
        &self,
        collection: &str,
        query: Option<&Map<String, Value>>,
        projection: Option<&Map<String, Value>>,
    ) -> Reported<Vec<Value>> {
        let filter = report(optional_document(query))?;
        let target = self.collection(collection);
        let mut action = target.find(filter);
        if let Some(projection) = projection {
            action = action.projection(report(object_to_document(projection))?);
        }
        let cursor = report(action.await)?;
        let docs: Vec<Document> = report(cursor.try_collect().await)?;
        Ok(docs.iter().map(document_to_json).collect())
    }

    /// Find the first document matching `query`, optionally projected.
    pub async fn find_one(
        &self,
        collection: &str,
        query: Option<&Map<String, Value>>,
        projection: Option<&Map<String, Value>>,
    ) -> Reported<Option<Value>> {
        let filter = report(optional_document(query))?;
        let target = self.collection(collection);
        let mut action = target.find_one(filter);
        if let Some(projection) = projection {
            action = action.projection(report(object_to_document(projection))?);
        }
        let found = report(action.await)?;
        Ok(found.as_ref().map(document_to_json))
    }

    /// Count documents matching `query`.
    pub async fn count_documents(
        &self,
        collection: &str,
        query: Option<&Map<String, Value>>,
    ) -> Reported<u64> {
        let filter = report(optional_document(query))?;
        report(self.collection(collection).count_documents(filter).await)
    }

    /// Insert one document and return its id.
    pub async fn insert_one(
        &self,
        collection: &str,
        document: &Map<String, Value>,
    ) -> Reported<Value> {
        let document = report(object_to_document(document))?;
        let result = report(self.collection(collection).insert_one(document).await)?;
        Ok(bson_to_json(&result.inserted_id))
    }

    /// Insert several documents and return their ids in input order.
    pub async fn insert_many(
        &self,
        collection: &str,
        documents: &[Map<String, Value>],
    ) -> Reported<Vec<Value>> {
        let documents = report(
            documents
                .iter()
                .map(object_to_document)
                .collect::<AgentResult<Vec<_>>>(),
        )?;
        let result = report(self.collection(collection).insert_many(documents).await)?;
        let mut ids: Vec<_> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.iter().map(|(_, id)| bson_to_json(id)).collect())
    }

    /// Set `update` fields on the first match; `true` if a document changed.
    pub async fn update_one(
        &self,
        collection: &str,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Reported<bool> {
        let (filter, set) = report(filter_and_set(query, update))?;
        let result = report(self.collection(collection).update_one(filter, set).await)?;
        Ok(result.modified_count == 1)
    }

    /// Set `update` fields on every match; returns the modified count.
    pub async fn update_many(
        &self,
        collection: &str,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Reported<u64> {
        let (filter, set) = report(filter_and_set(query, update))?;
        let result = report(self.collection(collection).update_many(filter, set).await)?;
        Ok(result.modified_count)
    }

    /// Delete the first match; `true` if a document was removed.
    pub async fn delete_one(&self, collection: &str, query: &Map<String, Value>) -> Reported<bool> {
        let filter = report(object_to_document(query))?;
        let result = report(self.collection(collection).delete_one(filter).await)?;
        Ok(result.deleted_count == 1)
    }

    /// Delete every match; returns the deleted count.
    pub async fn delete_many(&self, collection: &str, query: &Map<String, Value>) -> Reported<u64> {
        let filter = report(object_to_document(query))?;
        let result = report(self.collection(collection).delete_many(filter).await)?;
        Ok(result.deleted_count)
    }

    /// `dbStats` for the wrapped database.
    pub async fn database_info(&self) -> Reported<Value> {
        let stats = report(self.database.run_command(doc! { "dbStats": 1 }).await)?;
        Ok(document_to_json(&stats))
    }
}

impl DocumentDatabase for MongoDatabase {
    fn list_collection_names(&self) -> DbFuture<'_, AgentResult<Vec<String>>> {
        Box::pin(async move { Ok(self.usable.clone()) })
    }

    fn describe_collection<'a>(
        &'a self,
        name: &'a str,
    ) -> DbFuture<'a, AgentResult<CollectionMetadata>> {
        Box::pin(async move {
            let collection = self.collection(name);

            let mut cursor = collection.list_indexes().await?;
            let mut indexes = Vec::new();
            while let Some(model) = cursor.try_next().await? {
                let index_name = model
                    .options
                    .as_ref()
                    .and_then(|options| options.name.clone())
                    .unwrap_or_default();
                indexes.push(IndexSpec {
                    name: index_name,
                    keys: document_to_json(&model.keys),
                });
            }

            let samples = if self.sample_documents > 0 {
                let limit = i64::try_from(self.sample_documents).unwrap_or(i64::MAX);
                let docs: Vec<Document> = collection
                    .find(Document::new())
                    .limit(limit)
                    .await?
                    .try_collect()
                    .await?;
                docs.iter().map(document_to_json).collect()
            } else {
                Vec::new()
            };

            debug!(
                "Described collection {name}: {} indexes, {} samples",
                indexes.len(),
                samples.len()
            );
            Ok(CollectionMetadata {
                name: name.to_string(),
                indexes,
                samples,
            })
        })
    }

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: &'a [Stage],
    ) -> DbFuture<'a, AgentResult<Vec<Value>>> {
        Box::pin(async move {
            let stages = pipeline
                .iter()
                .map(object_to_document)
                .collect::<AgentResult<Vec<_>>>()?;
            let cursor = self.collection(collection).aggregate(stages).await?;
            let docs: Vec<Document> = cursor.try_collect().await?;
            Ok(docs.iter().map(document_to_json).collect())
        })
    }
}

fn optional_document(query: Option<&Map<String, Value>>) -> AgentResult<Document> {
    query.map_or_else(|| Ok(Document::new()), object_to_document)
}

fn filter_and_set(
    query: &Map<String, Value>,
    update: &Map<String, Value>,
) -> AgentResult<(Document, Document)> {
    let filter = object_to_document(query)?;
    let set = doc! { "$set": object_to_document(update)? };
    Ok((filter, set))
}

/// Apply the include/ignore filters to the full collection list.
///
/// # Errors
/// Returns an error if both lists are set or either names an unknown
/// collection.
pub fn usable_collections(
    all: &BTreeSet<String>,
    include: &[String],
    ignore: &[String],
) -> AgentResult<Vec<String>> {
    if !include.is_empty() && !ignore.is_empty() {
        return Err(AgentError::InvalidConfig(
            "cannot specify both include_collections and ignore_collections".to_string(),
        ));
    }

    let named = if include.is_empty() { ignore } else { include };
    let missing: Vec<&str> = named
        .iter()
        .filter(|name| !all.contains(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        let which = if include.is_empty() {
            "ignore_collections"
        } else {
            "include_collections"
        };
        return Err(AgentError::InvalidConfig(format!(
            "{which} {missing:?} not found in database"
        )));
    }

    let usable: BTreeSet<&String> = if include.is_empty() {
        all.iter().filter(|name| !ignore.contains(name)).collect()
    } else {
        include.iter().collect()
    };
    Ok(usable.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_usable_collections_default_is_all_sorted() {
        let all = names(&["tickets", "accounts", "groups"]);
        let usable = usable_collections(&all, &[], &[]).unwrap();
        assert_eq!(usable, vec!["accounts", "groups", "tickets"]);
    }

    #[test]
    fn test_usable_collections_include_and_ignore() {
        let all = names(&["tickets", "accounts", "sessions"]);
        let include = vec!["tickets".to_string(), "accounts".to_string()];
        assert_eq!(
            usable_collections(&all, &include, &[]).unwrap(),
            vec!["accounts", "tickets"]
        );

        let ignore = vec!["sessions".to_string()];
        assert_eq!(
            usable_collections(&all, &[], &ignore).unwrap(),
            vec!["accounts", "tickets"]
        );
    }

    #[test]
    fn test_usable_collections_rejects_unknown_and_both() {
        let all = names(&["tickets"]);
        let unknown = vec!["ghosts".to_string()];
        let err = usable_collections(&all, &unknown, &[]).unwrap_err();
        assert!(err.to_string().contains("include_collections"));

        let tickets = vec!["tickets".to_string()];
        assert!(usable_collections(&all, &tickets, &tickets).is_err());
    }

    #[test]
    fn test_report_formats_errors() {
        let failed: Result<u64, String> = Err("connection refused".to_string());
        assert_eq!(report(failed), Err("Error: connection refused".to_string()));
    }

    /// Runs against a live server when `QUADZ_TEST_MONGODB_URI` is set.
    #[tokio::test]
    async fn test_crud_helpers_against_live_server() {
        let Ok(uri) = std::env::var("QUADZ_TEST_MONGODB_URI") else {
            return;
        };
        let client = Client::with_uri_str(&uri).await.unwrap();
        let name = format!("quadz_crud_{}", uuid::Uuid::new_v4().simple());
        let db = MongoDatabase::from_database(client.database(&name), &DatabaseConfig::default())
            .await
            .unwrap();
        let object = |raw: &str| -> Map<String, Value> { serde_json::from_str(raw).unwrap() };

        db.insert_one("tickets", &object(r#"{"uid": 1, "status": "open", "subject": "Refund"}"#))
            .await
            .unwrap();
        let ids = db
            .insert_many(
                "tickets",
                &[
                    object(r#"{"uid": 2, "status": "open"}"#),
                    object(r#"{"uid": 3, "status": "open"}"#),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let projected = db
            .find("tickets", Some(&object(r#"{"uid": 1}"#)), Some(&object(r#"{"_id": 0, "subject": 1}"#)))
            .await
            .unwrap();
        assert_eq!(projected, vec![serde_json::json!({"subject": "Refund"})]);

        let one = db
            .find_one("tickets", None, Some(&object(r#"{"_id": 0, "uid": 1}"#)))
            .await
            .unwrap();
        assert!(one.is_some());
        assert_eq!(db.count_documents("tickets", None).await.unwrap(), 3);

        let status = object(r#"{"status": "closed"}"#);
        assert!(db.update_one("tickets", &object(r#"{"uid": 1}"#), &status).await.unwrap());
        assert_eq!(db.update_many("tickets", &object(r#"{"status": "open"}"#), &status).await.unwrap(), 2);
        assert!(db.delete_one("tickets", &object(r#"{"uid": 1}"#)).await.unwrap());
        assert_eq!(db.delete_many("tickets", &object("{}")).await.unwrap(), 2);

        let stats = db.database_info().await.unwrap();
        assert_eq!(stats["db"], Value::String(name.clone()));

        client.database(&name).drop().await.unwrap();
    }

    #[tokio::test]
    async fn test_crud_helpers_report_unreachable_server() {
        let client = Client::with_uri_str("mongodb://127.0.0.1:9/?serverSelectionTimeoutMS=200")
            .await
            .unwrap();
        let db = MongoDatabase {
            database: client.database("quadz_unreachable"),
            usable: Vec::new(),
            sample_documents: 1,
        };

        let found = db.find("tickets", None, None).await;
        assert!(found.unwrap_err().starts_with("Error: "));
        let counted = db.count_documents("tickets", None).await;
        assert!(counted.unwrap_err().starts_with("Error: "));
        assert!(db.database_info().await.unwrap_err().starts_with("Error: "));
    }

    #[test]
    fn test_filter_and_set_wraps_update() {
        let query: Map<String, Value> = serde_json::from_str(r#"{"uid": 7}"#).unwrap();
        let update: Map<String, Value> = serde_json::from_str(r#"{"status": "closed"}"#).unwrap();
        let (filter, set) = filter_and_set(&query, &update).unwrap();
        assert_eq!(filter.get_i32("uid").unwrap(), 7);
        assert_eq!(
            set.get_document("$set").unwrap().get_str("status").unwrap(),
            "closed"
        );
    }
}
