//! Schema description fetched from an external HTTP endpoint.
//!
//! The endpoint must answer `{"schema": {collection_name: schema_object}}`.
//! Anything else is a contract violation and fails the request outright.

use std::collections::BTreeSet;

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::common::errors::{AgentError, AgentResult};
use crate::schema::SchemaDescription;

/// Fetch the external schema and render it.
///
/// # Errors
/// Returns an error on transport failure, a non-JSON body, or a body
/// without a `schema` object.
pub async fn fetch_external(client: &Client, endpoint: &str) -> AgentResult<SchemaDescription> {
    info!("Fetching external schema from {endpoint}");
    let body: Value = client
        .get(endpoint)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let schema = schema_object(&body)?;
    debug!("External schema lists {} collections", schema.len());
    Ok(render_external(schema))
}

/// Extract the `schema` mapping from an endpoint response.
///
/// # Errors
/// Returns [`AgentError::SchemaContract`] when the key is absent or not an
/// object.
pub fn schema_object(body: &Value) -> AgentResult<&Map<String, Value>> {
    match body.get("schema") {
        Some(Value::Object(schema)) => Ok(schema),
        Some(_) => Err(AgentError::SchemaContract(
            "`schema` is not an object".to_string(),
        )),
        None => Err(AgentError::SchemaContract(
            "external schema response has no `schema` key".to_string(),
        )),
    }
}

/// Render one `Collection Name: <name>\tSchema: <json>` line per collection.
#[must_use]
pub fn render_external(schema: &Map<String, Value>) -> SchemaDescription {
    let text = schema
        .iter()
        .map(|(name, definition)| {
            let compact = definition.to_string().replace(' ', "");
            format!("Collection Name: {name}\tSchema: {compact}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    SchemaDescription {
        text,
        collections: schema.keys().cloned().collect::<BTreeSet<_>>(),
    }
}
