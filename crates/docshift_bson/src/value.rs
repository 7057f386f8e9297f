//! Dynamic BSON-style value type.

use crate::document::Document;
use crate::oid::ObjectId;
use chrono::{DateTime, Utc};

/// A dynamic BSON-style value.
///
/// This type represents any value the document mapper can hold. The
/// variants mirror the BSON type aliases used in `$jsonSchema` validators
/// (see [`Bson::type_name`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Bson {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// Text string (UTF-8).
    String(String),
    /// Point-in-time value.
    DateTime(DateTime<Utc>),
    /// Document identifier.
    ObjectId(ObjectId),
    /// Array of values.
    Array(Vec<Bson>),
    /// Nested document.
    Document(Document),
}

impl Bson {
    /// Returns the BSON type alias for this value.
    ///
    /// These are the aliases `$jsonSchema` validators use in their
    /// `bsonType` lists.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Bson::Null => "null",
            Bson::Bool(_) => "bool",
            Bson::Int(_) => "int",
            Bson::Double(_) => "double",
            Bson::String(_) => "string",
            Bson::DateTime(_) => "date",
            Bson::ObjectId(_) => "objectId",
            Bson::Array(_) => "array",
            Bson::Document(_) => "object",
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Bson::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Bson::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Bson::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double, if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bson::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bson::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a date, if it is one.
    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Bson::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Get this value as an object id, if it is one.
    #[must_use]
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Bson::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Bson]> {
        match self {
            Bson::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a document, if it is one.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Bson::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get this value as a document, mutably, if it is one.
    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Bson::Document(d) => Some(d),
            _ => None,
        }
    }
}

impl From<bool> for Bson {
    fn from(b: bool) -> Self {
        Bson::Bool(b)
    }
}

impl From<i64> for Bson {
    fn from(n: i64) -> Self {
        Bson::Int(n)
    }
}

impl From<i32> for Bson {
    fn from(n: i32) -> Self {
        Bson::Int(i64::from(n))
    }
}

impl From<u32> for Bson {
    fn from(n: u32) -> Self {
        Bson::Int(i64::from(n))
    }
}

impl From<f64> for Bson {
    fn from(n: f64) -> Self {
        Bson::Double(n)
    }
}

impl From<String> for Bson {
    fn from(s: String) -> Self {
        Bson::String(s)
    }
}

impl From<&str> for Bson {
    fn from(s: &str) -> Self {
        Bson::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Bson {
    fn from(dt: DateTime<Utc>) -> Self {
        Bson::DateTime(dt)
    }
}

impl From<ObjectId> for Bson {
    fn from(id: ObjectId) -> Self {
        Bson::ObjectId(id)
    }
}

impl From<Document> for Bson {
    fn from(d: Document) -> Self {
        Bson::Document(d)
    }
}

impl<T: Into<Bson>> From<Vec<T>> for Bson {
    fn from(v: Vec<T>) -> Self {
        Bson::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Bson {
    fn from((): ()) -> Self {
        Bson::Null
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Bson::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_bson_aliases() {
        assert_eq!(Bson::Null.type_name(), "null");
        assert_eq!(Bson::Bool(true).type_name(), "bool");
        assert_eq!(Bson::Int(1).type_name(), "int");
        assert_eq!(Bson::Double(1.5).type_name(), "double");
        assert_eq!(Bson::from("x").type_name(), "string");
        assert_eq!(Bson::DateTime(Utc::now()).type_name(), "date");
        assert_eq!(Bson::ObjectId(ObjectId::new()).type_name(), "objectId");
        assert_eq!(Bson::Array(vec![]).type_name(), "array");
        assert_eq!(Bson::Document(Document::new()).type_name(), "object");
    }

    #[test]
    fn value_accessors() {
        assert!(Bson::Null.is_null());
        assert!(!Bson::Bool(true).is_null());

        assert_eq!(Bson::Bool(true).as_bool(), Some(true));
        assert_eq!(Bson::Int(42).as_bool(), None);

        assert_eq!(Bson::Int(42).as_i64(), Some(42));
        assert_eq!(Bson::from("42").as_i64(), None);

        assert_eq!(Bson::Double(1.25).as_f64(), Some(1.25));
        assert_eq!(Bson::from("hello").as_str(), Some("hello"));

        let id = ObjectId::new();
        assert_eq!(Bson::ObjectId(id).as_object_id(), Some(id));
    }

    #[test]
    fn from_impls() {
        assert_eq!(Bson::from(true), Bson::Bool(true));
        assert_eq!(Bson::from(42i64), Bson::Int(42));
        assert_eq!(Bson::from(42i32), Bson::Int(42));
        assert_eq!(Bson::from(1.5f64), Bson::Double(1.5));
        assert_eq!(Bson::from("hello"), Bson::String("hello".to_string()));
        assert_eq!(Bson::from(()), Bson::Null);
        assert_eq!(Bson::from(None::<i64>), Bson::Null);
        assert_eq!(Bson::from(Some(2i64)), Bson::Int(2));
        assert_eq!(
            Bson::from(vec![1i64, 2, 3]),
            Bson::Array(vec![Bson::Int(1), Bson::Int(2), Bson::Int(3)])
        );
    }
}
