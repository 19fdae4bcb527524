//! The document-database collaborator consumed by the query pipeline.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::errors::AgentResult;

/// Boxed future type for database operations.
pub type DbFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One aggregation stage: a mapping with one dominant operator key.
pub type Stage = Map<String, Value>;

/// Index definition of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Key specification, e.g. `{"_id": 1}`.
    pub keys: Value,
}

/// Metadata used to describe a collection to the query generator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// Index definitions.
    pub indexes: Vec<IndexSpec>,
    /// Sample documents as JSON.
    pub samples: Vec<Value>,
}

/// Operations the pipeline needs from the live database.
pub trait DocumentDatabase: Send + Sync {
    /// Names of collections the assistant may query, sorted.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    fn list_collection_names(&self) -> DbFuture<'_, AgentResult<Vec<String>>>;

    /// Indexes and sample documents of one collection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    fn describe_collection<'a>(
        &'a self,
        name: &'a str,
    ) -> DbFuture<'a, AgentResult<CollectionMetadata>>;

    /// Run an aggregation pipeline against a named collection.
    ///
    /// # Errors
    /// Returns an error if a stage cannot be converted or the driver rejects it.
    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: &'a [Stage],
    ) -> DbFuture<'a, AgentResult<Vec<Value>>>;
}
