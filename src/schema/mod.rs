//! Schema descriptions that ground query generation.
//!
//! A description is the prompt text plus the set of collection names it
//! enumerates. Generated queries may only target names from the description
//! that grounded them; the executor checks this.

pub mod external;
pub mod local;

pub use external::{fetch_external, render_external, schema_object};
pub use local::{DatabaseContext, database_context, describe_local, render_collection};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::common::config::AgentConfig;
use crate::common::errors::AgentResult;
use crate::database::DocumentDatabase;

/// Textual grounding artifact plus the collection names it covers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Prompt-ready description.
    pub text: String,
    /// Collection names enumerated in `text`.
    pub collections: BTreeSet<String>,
}

impl SchemaDescription {
    /// Whether `collection` is enumerated by this description.
    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }
}

/// Where schema descriptions come from.
pub enum SchemaSource {
    /// Derived from live database metadata.
    Local {
        /// Database to describe.
        database: Arc<dyn DocumentDatabase>,
        /// Per-collection character cap.
        max_string_length: usize,
    },
    /// Fetched from an HTTP endpoint on every call.
    External {
        /// HTTP client.
        client: Client,
        /// Endpoint URL.
        endpoint: String,
    },
}

impl SchemaSource {
    /// Pick the external endpoint when configured, otherwise the database.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AgentConfig, database: Arc<dyn DocumentDatabase>) -> AgentResult<Self> {
        match &config.schema.external_endpoint {
            Some(endpoint) => {
                let client = Client::builder()
                    .timeout(Duration::from_secs(config.llm.timeout_seconds))
                    .build()?;
                Ok(Self::External {
                    client,
                    endpoint: endpoint.clone(),
                })
            }
            None => Ok(Self::Local {
                database,
                max_string_length: config.database.max_string_length,
            }),
        }
    }

    /// Produce a fresh description.
    ///
    /// # Errors
    /// Returns an error if metadata cannot be read or the external endpoint
    /// breaks its contract.
    pub async fn describe(&self) -> AgentResult<SchemaDescription> {
        match self {
            Self::Local {
                database,
                max_string_length,
            } => describe_local(database.as_ref(), *max_string_length).await,
            Self::External { client, endpoint } => fetch_external(client, endpoint).await,
        }
    }

    /// Prompt context that never fails; describe errors become `Error: ...` text.
    pub async fn context(&self) -> DatabaseContext {
        match self {
            Self::Local {
                database,
                max_string_length,
            } => database_context(database.as_ref(), *max_string_length).await,
            Self::External { .. } => match self.describe().await {
                Ok(description) => DatabaseContext {
                    collections_info: description.text,
                    collection_names: description
                        .collections
                        .into_iter()
                        .collect::<Vec<_>>()
                        .join(", "),
                },
                Err(e) => DatabaseContext {
                    collections_info: format!("Error: {e}"),
                    collection_names: String::new(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::CollectionMetadata;
    use crate::testing::InMemoryDatabase;

    #[tokio::test]
    async fn test_local_source_by_default() {
        let db = InMemoryDatabase::new().with_collection(CollectionMetadata {
            name: "tickets".to_string(),
            ..CollectionMetadata::default()
        });
        let source = SchemaSource::from_config(&AgentConfig::default(), Arc::new(db)).unwrap();
        assert!(matches!(source, SchemaSource::Local { .. }));

        let description = source.describe().await.unwrap();
        assert!(description.contains("tickets"));
        assert_eq!(description.text, "Collection Name: tickets");
    }

    #[tokio::test]
    async fn test_context_lists_names() {
        let db = InMemoryDatabase::new()
            .with_collection(CollectionMetadata {
                name: "users".to_string(),
                ..CollectionMetadata::default()
            })
            .with_collection(CollectionMetadata {
                name: "tickets".to_string(),
                ..CollectionMetadata::default()
            });
        let source = SchemaSource::from_config(&AgentConfig::default(), Arc::new(db)).unwrap();

        let context = source.context().await;
        assert_eq!(context.collection_names, "tickets, users");
        assert!(context.collections_info.contains("Collection Name: users"));
    }

    #[test]
    fn test_external_source_when_configured() {
        let mut config = AgentConfig::default();
        config.schema.external_endpoint = Some("http://localhost:9/schema".to_string());
        let source = SchemaSource::from_config(&config, Arc::new(InMemoryDatabase::new())).unwrap();
        assert!(matches!(source, SchemaSource::External { .. }));
    }
}
