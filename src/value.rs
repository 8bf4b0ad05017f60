//! JSON-like value tree that can also hold binary objects.
//!
//! Containers are reference-counted so an unchanged subtree can be handed
//! back from a rewrite without copying it; [`Value::ptr_eq`] observes that.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

use crate::blob::Blob;

pub type Array = Arc<Vec<Value>>;
pub type Object = Arc<BTreeMap<String, Value>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("value contains a binary object and cannot be represented as JSON")]
    ContainsBlob,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Array),
    Object(Object),
    Blob(Blob),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Arc::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(m) => m.get(key),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Array(a) => a.get(i),
            _ => None,
        }
    }

    /// True when `self` and `other` are the same node: the same container
    /// allocation, the same blob allocation, or equal scalars.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b))   => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Blob(a), Value::Blob(b))     => a.ptr_eq(b),
            (a, b) => a == b,
        }
    }

    /// True if any node in the tree is a binary object.
    pub fn contains_blob(&self) -> bool {
        match self {
            Value::Blob(_) => true,
            Value::Array(a) => a.iter().any(Value::contains_blob),
            Value::Object(m) => m.values().any(Value::contains_blob),
            _ => false,
        }
    }

    /// Convert to plain JSON.  Fails if the tree still holds binary objects.
    pub fn to_json(&self) -> Result<JsonValue, ValueError> {
        Ok(match self {
            Value::Null      => JsonValue::Null,
            Value::Bool(b)   => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(a)  => JsonValue::Array(a.iter().map(Value::to_json).collect::<Result<_, _>>()?),
            Value::Object(m) => {
                let mut out = Map::new();
                for (k, v) in m.iter() {
                    out.insert(k.clone(), v.to_json()?);
                }
                JsonValue::Object(out)
            }
            Value::Blob(_)   => return Err(ValueError::ContainsBlob),
        })
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null      => Value::Null,
            JsonValue::Bool(b)   => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(a)  => Value::array(a.into_iter().map(Value::from)),
            JsonValue::Object(m) => Value::object(m.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

impl TryFrom<&Value> for JsonValue {
    type Error = ValueError;
    fn try_from(v: &Value) -> Result<Self, ValueError> {
        v.to_json()
    }
}

impl From<Blob> for Value {
    fn from(b: Blob) -> Self { Value::Blob(b) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(n.into()) }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self { Value::Array(Arc::new(items)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let j = json!({ "a": [1, "two", null, { "b": false }], "c": 1.5 });
        let v = Value::from(j.clone());
        assert_eq!(v.to_json().unwrap(), j);
        assert!(!v.contains_blob());
    }

    #[test]
    fn blobs_block_json_conversion() {
        let v = Value::object([("x", Value::array([Value::from(Blob::from([1u8]))]))]);
        assert!(v.contains_blob());
        assert_eq!(v.to_json(), Err(ValueError::ContainsBlob));
    }

    #[test]
    fn ptr_eq_distinguishes_copies() {
        let v = Value::from(json!({ "k": [1] }));
        let same = v.clone();
        let copy = Value::from(json!({ "k": [1] }));
        assert!(v.ptr_eq(&same));
        assert!(!v.ptr_eq(&copy));
        assert_eq!(v, copy);
    }

    #[test]
    fn accessors() {
        let v = Value::from(json!({ "list": ["x"] }));
        assert_eq!(v.get("list").and_then(|l| l.index(0)).and_then(Value::as_str), Some("x"));
        assert!(v.get("missing").is_none());
    }
}
