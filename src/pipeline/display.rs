//! Display-format classification: does the user want text or a table?

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::llm::{CompletionRequest, TextCompletion};
use crate::pipeline::prompts::DISPLAY_FORMAT_SYSTEM;
use crate::query::{parse_literal, strip_code_fences};

/// How a fetched result should be shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    /// Summarise into a sentence.
    Text,
    /// Show the table as-is.
    #[default]
    Table,
}

impl FormatHint {
    /// Parse classifier output, if it names a format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let unfenced = strip_code_fences(raw);
        let unfenced = unfenced.trim();
        let named = match parse_literal(unfenced) {
            Ok(Value::Object(map)) => map
                .get("output_format")
                .and_then(Value::as_str)
                .map(str::to_ascii_lowercase),
            _ => Some(unfenced.trim_matches(|c: char| c == '"' || c == '\'').to_ascii_lowercase()),
        };
        match named.as_deref() {
            Some("text") => Some(Self::Text),
            Some("table") => Some(Self::Table),
            _ => None,
        }
    }
}

/// Classifies each user turn's preferred display format.
pub struct FormatClassifier {
    completion: Arc<dyn TextCompletion>,
}

impl FormatClassifier {
    /// Classifier backed by `completion`.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Classify `input`; failures fall back to [`FormatHint::Table`].
    pub async fn classify(&self, input: &str) -> FormatHint {
        let request = CompletionRequest::new(DISPLAY_FORMAT_SYSTEM, input);
        match self.completion.complete(&request).await {
            Ok(raw) => FormatHint::parse(&raw).unwrap_or_else(|| {
                warn!("Unrecognised display format {raw:?}, defaulting to table");
                FormatHint::default()
            }),
            Err(e) => {
                warn!("Display format classification failed: {e}");
                FormatHint::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    #[test]
    fn test_parse_variants() {
        assert_eq!(FormatHint::parse(r#"{"output_format": "text"}"#), Some(FormatHint::Text));
        assert_eq!(
            FormatHint::parse("```json\n{'output_format': 'Table'}\n```"),
            Some(FormatHint::Table)
        );
        assert_eq!(FormatHint::parse("text"), Some(FormatHint::Text));
        assert_eq!(FormatHint::parse("I think a chart"), None);
        assert_eq!(FormatHint::parse(r#"{"format": "text"}"#), None);
    }

    #[tokio::test]
    async fn test_classify_defaults_to_table() {
        let classifier = FormatClassifier::new(Arc::new(ScriptedCompletion::new().otherwise("maybe?")));
        assert_eq!(classifier.classify("tickets").await, FormatHint::Table);

        let failing = FormatClassifier::new(Arc::new(ScriptedCompletion::new()));
        assert_eq!(failing.classify("tickets").await, FormatHint::Table);

        let text = FormatClassifier::new(Arc::new(
            ScriptedCompletion::new().on("output_format", r#"{"output_format": "text"}"#),
        ));
        assert_eq!(text.classify("how many tickets?").await, FormatHint::Text);
    }
}
