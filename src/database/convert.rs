//! JSON ↔ BSON conversion at the driver boundary.
//!
//! Inbound, extended-JSON wrappers `{"$date": ..}` and `{"$oid": ..}` become
//! native BSON values. Outbound, ObjectIds become hex strings and dates become
//! RFC 3339 strings so flattened tables stay plain scalars.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, Document};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::common::errors::{AgentError, AgentResult};

/// Convert a JSON value into BSON.
///
/// # Errors
/// Returns an error on unparseable `$date`/`$oid` payloads or
/// non-representable numbers.
pub fn json_to_bson(value: &Value) -> AgentResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number_to_bson(n)?,
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(
            items
                .iter()
                .map(json_to_bson)
                .collect::<AgentResult<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            if let Some(special) = extended_json(map)? {
                special
            } else {
                Bson::Document(object_to_document(map)?)
            }
        }
    })
}

/// Convert a JSON object into a BSON document.
///
/// # Errors
/// Returns an error if any nested value cannot be converted.
pub fn object_to_document(map: &Map<String, Value>) -> AgentResult<Document> {
    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key.clone(), json_to_bson(value)?);
    }
    Ok(doc)
}

/// Convert a BSON document into JSON for flattening and display.
#[must_use]
pub fn document_to_json(doc: &Document) -> Value {
    let mut map = Map::new();
    for (key, value) in doc {
        map.insert(key.clone(), bson_to_json(value));
    }
    Value::Object(map)
}

/// Convert a BSON value into JSON.
#[must_use]
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
            .map_or(Value::Null, |d| {
                Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        other => other.clone().into_relaxed_extjson(),
    }
}

fn number_to_bson(n: &Number) -> AgentResult<Bson> {
    if let Some(i) = n.as_i64() {
        return Ok(i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32));
    }
    n.as_f64()
        .map(Bson::Double)
        .ok_or_else(|| AgentError::Bson(format!("number out of range: {n}")))
}

fn extended_json(map: &Map<String, Value>) -> AgentResult<Option<Bson>> {
    if map.len() != 1 {
        return Ok(None);
    }
    if let Some(Value::String(iso)) = map.get("$date") {
        let parsed = DateTime::parse_from_rfc3339(iso)
            .map_err(|e| AgentError::Bson(format!("invalid $date {iso}: {e}")))?;
        return Ok(Some(Bson::DateTime(bson::DateTime::from_millis(
            parsed.timestamp_millis(),
        ))));
    }
    if let Some(Value::String(hex)) = map.get("$oid") {
        let oid = ObjectId::parse_str(hex)
            .map_err(|e| AgentError::Bson(format!("invalid $oid {hex}: {e}")))?;
        return Ok(Some(Bson::ObjectId(oid)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extended_json_dates_become_native() {
        let stage = json!({"$match": {"date": {"$gte": {"$date": "2024-03-01T00:00:00Z"}}}});
        let bson = json_to_bson(&stage).unwrap();
        let date = bson
            .as_document()
            .and_then(|d| d.get_document("$match").ok())
            .and_then(|d| d.get_document("date").ok())
            .and_then(|d| d.get("$gte"))
            .unwrap();
        assert!(matches!(date, Bson::DateTime(_)));
    }

    #[test]
    fn test_small_integers_stay_int32() {
        assert_eq!(json_to_bson(&json!(10)).unwrap(), Bson::Int32(10));
        assert_eq!(
            json_to_bson(&json!(10_000_000_000_i64)).unwrap(),
            Bson::Int64(10_000_000_000)
        );
        assert_eq!(json_to_bson(&json!(1.5)).unwrap(), Bson::Double(1.5));
    }

    #[test]
    fn test_invalid_object_id_is_an_error() {
        assert!(json_to_bson(&json!({"$oid": "nope"})).is_err());
    }

    #[test]
    fn test_bson_to_json_scalars() {
        let oid = ObjectId::parse_str("65f1c0ffee0000000000beef").unwrap();
        let mut doc = Document::new();
        doc.insert("_id", Bson::ObjectId(oid));
        doc.insert("date", Bson::DateTime(bson::DateTime::from_millis(0)));
        doc.insert("n", Bson::Int32(3));

        let value = document_to_json(&doc);
        assert_eq!(value["_id"], "65f1c0ffee0000000000beef");
        assert_eq!(value["date"], "1970-01-01T00:00:00.000Z");
        assert_eq!(value["n"], 3);
    }
}
