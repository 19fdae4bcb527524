//! Flattening of nested documents into single-level records.
//!
//! Nested mappings merge into the parent under `parent_child` keys. Lists
//! expand in place: mapping entries are flattened under the list's key and
//! scalar entries become repeated entries of that key, so one record can hold
//! the same key several times. Any key containing the `__v` version marker is
//! dropped at every depth.
//!
//! On the wire a record is a JSON object. A key holding one value maps to
//! that value; a key holding several maps to `{"__repeated": [...]}`, so an
//! array value never reads back as repeated entries.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Separator between parent and child keys.
pub const KEY_SEPARATOR: &str = "_";

/// Version-control metadata marker; keys containing it are dropped.
pub const METADATA_MARKER: &str = "__v";

/// Wrapper key marking the values of a repeated key in serialized records.
pub const REPEATED_MARKER: &str = "__repeated";

/// Ordered record of flat key/value entries; keys may repeat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatRecord {
    entries: Vec<(String, Value)>,
}

impl FlatRecord {
    /// Empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry, keeping earlier entries with the same key.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.entries.push((key.into(), value));
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Every value stored under `key`, in order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&Value> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Distinct keys in first-seen order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.entries {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    /// Number of entries, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same entries with every key passed through `relabel`.
    #[must_use]
    pub fn relabeled(self, relabel: impl Fn(&str) -> String) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (relabel(&k), v))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct Repeated<'a> {
    #[serde(rename = "__repeated")]
    values: &'a [&'a Value],
}

fn repeated_values(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(REPEATED_MARKER)?.as_array(),
        _ => None,
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keys = self.keys();
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            let values = self.get_all(key);
            match values.as_slice() {
                [single] if repeated_values(single).is_none() => map.serialize_entry(key, single)?,
                many => map.serialize_entry(key, &Repeated { values: many })?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FlatRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FlatRecordVisitor)
    }
}

struct FlatRecordVisitor;

impl<'de> Visitor<'de> for FlatRecordVisitor {
    type Value = FlatRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a flat record object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FlatRecord, A::Error> {
        let mut record = FlatRecord::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            match repeated_values(&value) {
                Some(items) => {
                    for item in items {
                        record.push(key.clone(), item.clone());
                    }
                }
                None => record.push(key, value),
            }
        }
        Ok(record)
    }
}

/// Flatten one document.
#[must_use]
pub fn flatten_document(document: &Map<String, Value>) -> FlatRecord {
    let mut record = FlatRecord::new();
    flatten_into(&mut record, document, "");
    record
}

fn flatten_into(record: &mut FlatRecord, document: &Map<String, Value>, parent: &str) {
    for (key, value) in document {
        let flat_key = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}{KEY_SEPARATOR}{key}")
        };

        match value {
            Value::Object(nested) => flatten_into(record, nested, &flat_key),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(nested) => flatten_into(record, nested, &flat_key),
                        _ if flat_key.contains(METADATA_MARKER) => {}
                        scalar => record.push(flat_key.clone(), scalar.clone()),
                    }
                }
            }
            _ if flat_key.contains(METADATA_MARKER) => {}
            scalar => record.push(flat_key, scalar.clone()),
        }
    }
}

/// Display label for a flat key: `created_at` becomes `Created At`.
#[must_use]
pub fn titleize(key: &str) -> String {
    key.split(KEY_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
