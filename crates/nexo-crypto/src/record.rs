//! The sensitive payload
//!
//! A [`PersonalRecord`] is a flat JSON object (identity, disability
//! classification, support technologies, verification metadata). The codec
//! layer never looks at field semantics; it only needs the record to be a
//! JSON object so it round-trips through the cipher unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CipherError, Result};

/// A freely JSON-serializable accreditation record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalRecord(Map<String, Value>);

impl PersonalRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; only objects are records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Set a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String field, ignoring empty strings
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// True when the field is present and not null/empty/false-y text.
    pub fn has_value(&self, name: &str) -> bool {
        match self.0.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Canonical byte form: compact JSON with keys in sorted order.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| CipherError::Serialization(e.to_string()))
    }
}

impl From<Map<String, Value>> for PersonalRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
