//! Relaxed extended-JSON interop.
//!
//! Object ids and dates have no native JSON form, so they travel wrapped
//! the way document databases conventionally wrap them: `{"$oid": "…"}`
//! and `{"$date": "…"}` (RFC 3339). Everything else maps structurally.

use crate::document::Document;
use crate::error::{BsonError, BsonResult};
use crate::oid::ObjectId;
use crate::value::Bson;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as Json};

impl Bson {
    /// Converts this value to relaxed extended JSON.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Bson::Null => Json::Null,
            Bson::Bool(b) => Json::Bool(*b),
            Bson::Int(n) => json!(n),
            Bson::Double(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Bson::String(s) => Json::String(s.clone()),
            Bson::DateTime(dt) => json!({ "$date": dt.to_rfc3339() }),
            Bson::ObjectId(id) => json!({ "$oid": id.to_hex() }),
            Bson::Array(items) => Json::Array(items.iter().map(Bson::to_json).collect()),
            Bson::Document(doc) => doc.to_json(),
        }
    }

    /// Builds a value from relaxed extended JSON.
    pub fn from_json(json: &Json) -> BsonResult<Self> {
        match json {
            Json::Null => Ok(Bson::Null),
            Json::Bool(b) => Ok(Bson::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Bson::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Bson::Double(f))
                } else {
                    Err(BsonError::invalid_json(format!("unrepresentable number {n}")))
                }
            }
            Json::String(s) => Ok(Bson::String(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(Bson::from_json)
                .collect::<BsonResult<Vec<_>>>()
                .map(Bson::Array),
            Json::Object(map) => from_json_object(map),
        }
    }
}

impl Document {
    /// Converts this document to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (key, value) in self.iter() {
            map.insert(key.to_string(), value.to_json());
        }
        Json::Object(map)
    }

    /// Builds a document from a JSON object.
    ///
    /// Returns an error when `json` is not an object, or when a nested
    /// wrapper (`$oid`, `$date`) is malformed.
    pub fn from_json(json: &Json) -> BsonResult<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| BsonError::invalid_json("expected a JSON object"))?;

        let mut doc = Document::new();
        for (key, value) in map {
            doc.set(key.clone(), Bson::from_json(value)?);
        }
        Ok(doc)
    }
}

fn from_json_object(map: &Map<String, Json>) -> BsonResult<Bson> {
    if map.len() == 1 {
        if let Some(Json::String(hex)) = map.get("$oid") {
            return ObjectId::parse_str(hex).map(Bson::ObjectId);
        }
        if let Some(Json::String(raw)) = map.get("$date") {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|_| BsonError::invalid_date(raw))?;
            return Ok(Bson::DateTime(parsed.with_timezone(&Utc)));
        }
    }

    let mut doc = Document::new();
    for (key, value) in map {
        doc.set(key.clone(), Bson::from_json(value)?);
    }
    Ok(Bson::Document(doc))
}
