//! Schema description derived from live database metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::errors::AgentResult;
use crate::database::{CollectionMetadata, DocumentDatabase};
use crate::schema::SchemaDescription;

/// Suffix appended to a truncated collection block.
pub const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Describe every usable collection of `database`.
///
/// # Errors
/// Returns an error if the collection list or any collection's metadata
/// cannot be read.
pub async fn describe_local(
    database: &dyn DocumentDatabase,
    max_string_length: usize,
) -> AgentResult<SchemaDescription> {
    let names = database.list_collection_names().await?;
    let mut blocks = Vec::with_capacity(names.len());
    for name in &names {
        let metadata = database.describe_collection(name).await?;
        blocks.push(render_collection(&metadata, max_string_length));
    }
    debug!("Described {} collections locally", names.len());

    Ok(SchemaDescription {
        text: blocks.join("\n\n"),
        collections: names.into_iter().collect::<BTreeSet<_>>(),
    })
}

/// Render one collection block: name, indexes, sample documents.
#[must_use]
pub fn render_collection(metadata: &CollectionMetadata, max_string_length: usize) -> String {
    let mut info = format!("Collection Name: {}\n", metadata.name);

    if !metadata.indexes.is_empty() {
        info.push_str("Indexes:\n");
        for index in &metadata.indexes {
            info.push_str(&format!("\tName: {}, Key: {}\n", index.name, index.keys));
        }
    }

    for sample in &metadata.samples {
        let compact = sample.to_string().replace(' ', "");
        info.push_str(&format!("Sample Document: {compact}\n"));
    }

    truncate_block(&info, max_string_length).trim().to_string()
}

/// Cut `content` to `max_chars` characters, marking the cut; 0 keeps it whole.
#[must_use]
pub fn truncate_block(content: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return content.to_string();
    }
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_SUFFIX}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Database context for prompts: rendered collections and their names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseContext {
    /// Rendered collection blocks, or an `Error: ...` line.
    pub collections_info: String,
    /// Comma-separated usable collection names.
    pub collection_names: String,
}

/// Build the prompt context without failing: describe errors become text.
pub async fn database_context(
    database: &dyn DocumentDatabase,
    max_string_length: usize,
) -> DatabaseContext {
    let collection_names = match database.list_collection_names().await {
        Ok(names) => names.join(", "),
        Err(e) => {
            warn!("Failed to list collections: {e}");
            String::new()
        }
    };
    let collections_info = match describe_local(database, max_string_length).await {
        Ok(description) => description.text,
        Err(e) => format!("Error: {e}"),
    };

    DatabaseContext {
        collections_info,
        collection_names,
    }
}
