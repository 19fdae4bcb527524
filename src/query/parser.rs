//! Recover a `(collection, pipeline)` pair from raw synthesizer output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::database::Stage;
use crate::query::literal::parse_literal;

/// Label separating the pipeline literal from the collection name in the
/// legacy text format.
const COLLECTION_LABEL: &str = "MongoDBCollection:";

/// Labels that may precede the pipeline literal.
const PIPELINE_LABELS: [&str; 2] = ["PyMongoPipeline:", "pipeline ="];

/// Structured query recovered from generator output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    /// Target collection.
    pub collection: String,
    /// Aggregation stages in order.
    pub pipeline: Vec<Stage>,
}

/// Parse synthesizer output.
///
/// Returns `None` when no non-empty collection and pipeline can be
/// recovered; callers treat that as "nothing to run".
#[must_use]
pub fn parse_candidate(raw: &str) -> Option<CandidateQuery> {
    debug!("Parsing candidate query from: {raw}");

    if let Some(query) = object_form(raw.trim()) {
        return Some(query);
    }

    let cleaned = strip_code_fences(raw).replace(['\n', '\r'], " ");
    let cleaned = cleaned.trim();
    if let Some(query) = object_form(cleaned) {
        return Some(query);
    }
    if let Some(query) = balanced_object(cleaned).and_then(object_form) {
        return Some(query);
    }

    let query = labeled_form(cleaned);
    if query.is_none() {
        warn!("No collection and pipeline recoverable from generator output");
    }
    query
}

fn object_form(text: &str) -> Option<CandidateQuery> {
    let Ok(Value::Object(map)) = parse_literal(text) else {
        return None;
    };
    let collection = map.get("collection").and_then(Value::as_str)?.trim();
    let pipeline = map.get("pipeline").and_then(stages)?;
    build(collection, pipeline)
}

fn labeled_form(text: &str) -> Option<CandidateQuery> {
    let mut text = text.to_string();
    for label in PIPELINE_LABELS {
        text = text.replace(label, "");
    }

    let (pipeline_part, collection_part) = text.split_once(COLLECTION_LABEL)?;
    let collection = collection_part
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .trim_end_matches('.');

    let pipeline = parse_literal(pipeline_part.trim()).ok()?;
    build(collection, stages(&pipeline)?)
}

fn build(collection: &str, pipeline: Vec<Stage>) -> Option<CandidateQuery> {
    if collection.is_empty() || pipeline.is_empty() {
        return None;
    }
    Some(CandidateQuery {
        collection: collection.to_string(),
        pipeline,
    })
}

/// Accept a list of stage objects, or a single stage object.
fn stages(value: &Value) -> Option<Vec<Stage>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().cloned())
            .collect(),
        Value::Object(stage) => Some(vec![stage.clone()]),
        _ => None,
    }
}

/// Remove Markdown code fences and their language tags.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = rest[idx + 3..].trim_start_matches(|c: char| c.is_ascii_alphabetic());
    }
    out.push_str(rest);
    out
}

/// The first `{...}` span with balanced braces, ignoring braces in strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn stage(value: Value) -> Stage {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_json_object_form() {
        let query = parse_candidate(
            r#"{"collection": "tickets", "pipeline": [{"$match": {"sentiment": "negative"}}, {"$limit": 10}]}"#,
        )
        .unwrap();
        assert_eq!(query.collection, "tickets");
        assert_eq!(
            query.pipeline,
            vec![
                stage(json!({"$match": {"sentiment": "negative"}})),
                stage(json!({"$limit": 10}))
            ]
        );
    }

    #[test]
    fn test_legacy_labeled_form_matches_object_form() {
        let labeled = "PyMongoPipeline: [{'$match': {'sentiment': 'negative'}}, {'$limit': 10}]\nMongoDBCollection: tickets";
        let object = r#"{"collection": "tickets", "pipeline": [{"$match": {"sentiment": "negative"}}, {"$limit": 10}]}"#;
        assert_eq!(parse_candidate(labeled), parse_candidate(object));
        assert!(parse_candidate(labeled).is_some());
    }

    #[test]
    fn test_fenced_output_with_prose() {
        let raw = "```json\n{\"collection\": \"tickets\",\n \"pipeline\": [{\"$count\": \"total_tickets\"}]}\n```\nThis counts every ticket.";
        let query = parse_candidate(raw).unwrap();
        assert_eq!(query.collection, "tickets");
        assert_eq!(query.pipeline, vec![stage(json!({"$count": "total_tickets"}))]);
    }

    #[test]
    fn test_legacy_form_with_trailing_labels() {
        let raw = "```python\npipeline = [{'$match': {'date': {'$gte': datetime.datetime(2024, 3, 1)}}}]\n```\nMongoDBCollection: \"tickets\"\nNoSQLResult: ...";
        let query = parse_candidate(raw).unwrap();
        assert_eq!(query.collection, "tickets");
        assert_eq!(
            query.pipeline,
            vec![stage(json!({"$match": {"date": {"$gte": {"$date": "2024-03-01T00:00:00.000Z"}}}}))]
        );
    }

    #[test]
    fn test_unrecoverable_output_is_none() {
        assert_eq!(parse_candidate("I could not build a query for that."), None);
        assert_eq!(parse_candidate(r#"{"collection": "", "pipeline": [{"$limit": 1}]}"#), None);
        assert_eq!(parse_candidate(r#"{"collection": "tickets", "pipeline": []}"#), None);
        assert_eq!(parse_candidate("PyMongoPipeline: [] MongoDBCollection: tickets"), None);
    }

    #[test]
    fn test_balanced_object_ignores_braces_in_strings() {
        let text = r#"Here: {"a": "}{", "b": {"c": 1}} done"#;
        assert_eq!(balanced_object(text), Some(r#"{"a": "}{", "b": {"c": 1}}"#));
    }
}
