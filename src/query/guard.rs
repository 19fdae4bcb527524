//! Stage allow-list applied before a generated pipeline reaches the database.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::database::Stage;
use crate::schema::SchemaDescription;

/// Read and transform stage operators.
pub const READ_ONLY_STAGES: [&str; 26] = [
    "$match",
    "$project",
    "$lookup",
    "$unwind",
    "$group",
    "$sort",
    "$limit",
    "$skip",
    "$count",
    "$addFields",
    "$set",
    "$unset",
    "$facet",
    "$bucket",
    "$bucketAuto",
    "$sortByCount",
    "$replaceRoot",
    "$replaceWith",
    "$sample",
    "$graphLookup",
    "$unionWith",
    "$densify",
    "$fill",
    "$setWindowFields",
    "$redact",
    "$geoNear",
];

/// Why a pipeline was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    /// A stage is not a single-operator mapping.
    #[error("stage {index} must contain exactly one operator")]
    MalformedStage {
        /// Position within its pipeline.
        index: usize,
    },
    /// The operator is not on the allow-list (e.g. `$out`, `$merge`).
    #[error("stage operator {operator} is not allowed")]
    DisallowedStage {
        /// Offending operator.
        operator: String,
    },
    /// A join or union names a collection outside the schema description.
    #[error("collection {collection} is not in the schema description")]
    UnknownCollection {
        /// Offending collection name.
        collection: String,
    },
}

/// Allow-list of stage operators, checked recursively through sub-pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicy {
    allowed: Option<BTreeSet<String>>,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self::read_only()
    }
}

impl StagePolicy {
    /// Only read/transform operators; foreign collections must be described.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            allowed: Some(READ_ONLY_STAGES.iter().map(|s| (*s).to_string()).collect()),
        }
    }

    /// Accept any pipeline.
    #[must_use]
    pub const fn permissive() -> Self {
        Self { allowed: None }
    }

    /// Policy matching the `enforce_read_only` switch.
    #[must_use]
    pub fn from_switch(enforce_read_only: bool) -> Self {
        if enforce_read_only {
            Self::read_only()
        } else {
            Self::permissive()
        }
    }

    /// Check every stage, including nested sub-pipelines.
    ///
    /// # Errors
    /// Returns the first [`GuardViolation`] found.
    pub fn check(
        &self,
        pipeline: &[Stage],
        schema: &SchemaDescription,
    ) -> Result<(), GuardViolation> {
        let Some(allowed) = &self.allowed else {
            return Ok(());
        };
        check_pipeline(allowed, pipeline, schema)
    }
}

fn check_pipeline(
    allowed: &BTreeSet<String>,
    pipeline: &[Stage],
    schema: &SchemaDescription,
) -> Result<(), GuardViolation> {
    for (index, stage) in pipeline.iter().enumerate() {
        let mut entries = stage.iter();
        let (Some((operator, body)), None) = (entries.next(), entries.next()) else {
            return Err(GuardViolation::MalformedStage { index });
        };
        if !allowed.contains(operator) {
            return Err(GuardViolation::DisallowedStage {
                operator: operator.clone(),
            });
        }
        check_nested(allowed, operator, body, schema)?;
    }
    Ok(())
}

fn check_nested(
    allowed: &BTreeSet<String>,
    operator: &str,
    body: &Value,
    schema: &SchemaDescription,
) -> Result<(), GuardViolation> {
    match (operator, body) {
        ("$facet", Value::Object(facets)) => {
            for sub in facets.values() {
                check_sub_pipeline(allowed, Some(sub), schema)?;
            }
        }
        ("$lookup" | "$graphLookup", Value::Object(spec)) => {
            check_foreign(spec.get("from"), schema)?;
            check_sub_pipeline(allowed, spec.get("pipeline"), schema)?;
        }
        ("$unionWith", Value::String(collection)) => {
            check_foreign(Some(&Value::String(collection.clone())), schema)?;
        }
        ("$unionWith", Value::Object(spec)) => {
            check_foreign(spec.get("coll"), schema)?;
            check_sub_pipeline(allowed, spec.get("pipeline"), schema)?;
        }
        _ => {}
    }
    Ok(())
}

fn check_sub_pipeline(
    allowed: &BTreeSet<String>,
    sub: Option<&Value>,
    schema: &SchemaDescription,
) -> Result<(), GuardViolation> {
    let Some(Value::Array(items)) = sub else {
        return Ok(());
    };
    let stages: Vec<Map<String, Value>> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object()
                .cloned()
                .ok_or(GuardViolation::MalformedStage { index })
        })
        .collect::<Result<_, _>>()?;
    check_pipeline(allowed, &stages, schema)
}

fn check_foreign(name: Option<&Value>, schema: &SchemaDescription) -> Result<(), GuardViolation> {
    match name.and_then(Value::as_str) {
        Some(collection) if !schema.contains(collection) => Err(GuardViolation::UnknownCollection {
            collection: collection.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pipeline(value: Value) -> Vec<Stage> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_object().unwrap().clone())
            .collect()
    }

    fn schema() -> SchemaDescription {
        SchemaDescription {
            text: String::new(),
            collections: ["tickets".to_string(), "accounts".to_string()].into(),
        }
    }

    #[test]
    fn test_read_pipeline_passes() {
        let stages = pipeline(json!([
            {"$match": {"sentiment": "negative"}},
            {"$lookup": {"from": "accounts", "localField": "aid", "foreignField": "_id", "as": "account"}},
            {"$project": {"subject": 1, "date": 1}},
            {"$limit": 10}
        ]));
        assert_eq!(StagePolicy::read_only().check(&stages, &schema()), Ok(()));
    }

    #[test]
    fn test_write_stages_rejected() {
        let stages = pipeline(json!([{"$match": {}}, {"$out": "stolen"}]));
        assert_eq!(
            StagePolicy::read_only().check(&stages, &schema()),
            Err(GuardViolation::DisallowedStage {
                operator: "$out".to_string()
            })
        );
        assert_eq!(StagePolicy::permissive().check(&stages, &schema()), Ok(()));
    }

    #[test]
    fn test_nested_pipelines_checked() {
        let stages = pipeline(json!([
            {"$facet": {"recent": [{"$sort": {"date": -1}}, {"$merge": {"into": "x"}}]}}
        ]));
        assert!(matches!(
            StagePolicy::default().check(&stages, &schema()),
            Err(GuardViolation::DisallowedStage { operator }) if operator == "$merge"
        ));

        let stages = pipeline(json!([{"$unionWith": {"coll": "accounts", "pipeline": [{"$out": "y"}]}}]));
        assert!(StagePolicy::default().check(&stages, &schema()).is_err());
    }

    #[test]
    fn test_foreign_collections_must_be_described() {
        let stages = pipeline(json!([{"$lookup": {"from": "users", "as": "u"}}]));
        assert_eq!(
            StagePolicy::read_only().check(&stages, &schema()),
            Err(GuardViolation::UnknownCollection {
                collection: "users".to_string()
            })
        );

        let stages = pipeline(json!([{"$unionWith": "ghosts"}]));
        assert!(StagePolicy::read_only().check(&stages, &schema()).is_err());
    }

    #[test]
    fn test_multi_operator_stage_is_malformed() {
        let stages = pipeline(json!([{"$match": {}, "$limit": 1}]));
        assert_eq!(
            StagePolicy::read_only().check(&stages, &schema()),
            Err(GuardViolation::MalformedStage { index: 0 })
        );
    }
}
