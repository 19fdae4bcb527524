//! Tabular query results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::flatten::{FlatRecord, flatten_document, titleize};

/// Flattened records with display-ready column labels.
///
/// Serialises record-oriented: a JSON array with one object per record,
/// repeated keys wrapped as described in [`crate::query::flatten`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FlatRecord>", into = "Vec<FlatRecord>")]
pub struct TabularResult {
    columns: Vec<String>,
    records: Vec<FlatRecord>,
}

impl From<Vec<FlatRecord>> for TabularResult {
    fn from(records: Vec<FlatRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }
        Self { columns, records }
    }
}

impl From<TabularResult> for Vec<FlatRecord> {
    fn from(result: TabularResult) -> Self {
        result.records
    }
}

impl TabularResult {
    /// Result with no rows.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            columns: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Flatten raw documents and titleize their keys.
    ///
    /// Non-object values are kept under a `Value` column.
    #[must_use]
    pub fn from_documents(documents: &[Value]) -> Self {
        let records = documents
            .iter()
            .map(|doc| match doc {
                Value::Object(map) => flatten_document(map).relabeled(titleize),
                other => {
                    let mut record = FlatRecord::new();
                    record.push("Value", other.clone());
                    record
                }
            })
            .collect::<Vec<_>>();
        Self::from(records)
    }

    /// Column labels in first-seen order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in result order.
    #[must_use]
    pub fn records(&self) -> &[FlatRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Plain-text table with a 1-based index column, right-aligned cells.
    #[must_use]
    pub fn to_text(&self) -> String {
        if self.records.is_empty() {
            return "Empty table".to_string();
        }

        let rows: Vec<Vec<String>> = self
            .records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|column| {
                        record
                            .get_all(column)
                            .into_iter()
                            .map(cell_text)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect()
            })
            .collect();

        let index_width = self.records.len().to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                rows.iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(column.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(rows.len() + 1);
        let mut header = " ".repeat(index_width);
        for (column, width) in self.columns.iter().zip(&widths) {
            header.push_str(&format!("  {column:>width$}"));
        }
        lines.push(header.trim_end().to_string());

        for (i, row) in rows.iter().enumerate() {
            let mut line = format!("{:>index_width$}", i + 1);
            for (cell, width) in row.iter().zip(&widths) {
                line.push_str(&format!("  {cell:>width$}"));
            }
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
