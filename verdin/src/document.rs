//! Structured key-value documents exchanged with the backend engine.
//!
//! Results, settings and notifications are all loosely-typed trees. We keep
//! them as owned JSON maps but require call sites to go through accessors
//! which fail explicitly on a missing key or a type mismatch, rather than
//! silently defaulting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Interpret a JSON value as a document. Fails if it is not an object.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DocumentError::NotAnObject(value_type(&other))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn str_at(&self, key: &str) -> Result<&str, DocumentError> {
        self.value_at(key)?
            .as_str()
            .ok_or_else(|| self.mismatch(key, "string"))
    }

    pub fn int_at(&self, key: &str) -> Result<i64, DocumentError> {
        self.value_at(key)?
            .as_i64()
            .ok_or_else(|| self.mismatch(key, "integer"))
    }

    pub fn bool_at(&self, key: &str) -> Result<bool, DocumentError> {
        self.value_at(key)?
            .as_bool()
            .ok_or_else(|| self.mismatch(key, "bool"))
    }

    pub fn array_at(&self, key: &str) -> Result<&[Value], DocumentError> {
        self.value_at(key)?
            .as_array()
            .map(|a| a.as_slice())
            .ok_or_else(|| self.mismatch(key, "array"))
    }

    pub fn doc_at(&self, key: &str) -> Result<Document, DocumentError> {
        self.value_at(key)?
            .as_object()
            .map(|m| Document(m.clone()))
            .ok_or_else(|| self.mismatch(key, "object"))
    }

    /// `Ok(None)` when the key is absent, an error when it is present with
    /// the wrong type.
    pub fn maybe_str(&self, key: &str) -> Result<Option<&str>, DocumentError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| self.mismatch(key, "string")),
        }
    }

    pub fn maybe_int(&self, key: &str) -> Result<Option<i64>, DocumentError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.mismatch(key, "integer")),
        }
    }

    pub fn maybe_bool(&self, key: &str) -> Result<Option<bool>, DocumentError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.mismatch(key, "bool")),
        }
    }

    pub fn maybe_doc(&self, key: &str) -> Result<Option<Document>, DocumentError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_object()
                .map(|m| Some(Document(m.clone())))
                .ok_or_else(|| self.mismatch(key, "object")),
        }
    }

    fn value_at(&self, key: &str) -> Result<&Value, DocumentError> {
        self.0
            .get(key)
            .ok_or_else(|| DocumentError::Missing(key.to_string()))
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> DocumentError {
        let found = self.0.get(key).map(value_type).unwrap_or("missing");
        DocumentError::WrongType {
            key: key.to_string(),
            expected,
            found,
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    Missing(String),
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    NotAnObject(&'static str),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "Missing key '{}'", key),
            Self::WrongType {
                key,
                expected,
                found,
            } => write!(
                f,
                "Key '{}' has type {} but {} was expected",
                key, found, expected
            ),
            Self::NotAnObject(found) => {
                write!(f, "Expected an object document, found {}", found)
            }
        }
    }
}

impl std::error::Error for DocumentError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::from_value(json!({
            "name": "main",
            "pointer": 4,
            "liquid": true,
            "subaccounts": [0, 1],
            "fees": { "minimum": 1000 },
        }))
        .unwrap()
    }

    #[test]
    fn accessors() {
        let doc = sample();
        assert_eq!(doc.str_at("name").unwrap(), "main");
        assert_eq!(doc.int_at("pointer").unwrap(), 4);
        assert!(doc.bool_at("liquid").unwrap());
        assert_eq!(doc.array_at("subaccounts").unwrap().len(), 2);
        assert_eq!(doc.doc_at("fees").unwrap().int_at("minimum").unwrap(), 1000);
    }

    #[test]
    fn missing_key_is_explicit() {
        let doc = sample();
        assert_eq!(
            doc.str_at("unit"),
            Err(DocumentError::Missing("unit".to_string()))
        );
        assert_eq!(doc.maybe_str("unit"), Ok(None));
    }

    #[test]
    fn type_mismatch_is_explicit() {
        let doc = sample();
        assert!(matches!(
            doc.str_at("pointer"),
            Err(DocumentError::WrongType { expected: "string", found: "number", .. })
        ));
        // A present key with the wrong type must not read as absent.
        assert!(doc.maybe_int("name").is_err());
    }

    #[test]
    fn round_trips_through_serde() {
        let doc = sample();
        let raw = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("text")).is_err());
    }
}
