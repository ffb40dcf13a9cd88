//! Dynamically-typed values.
//!
//! `Value` is the universal in-memory form of element and link payloads.
//! Its shape is only known once a type descriptor is consulted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
pub use serde_json::Number;

/// Ordered object map. Keys iterate in sorted order so JSON output is stable.
pub type Object = BTreeMap<String, Value>;

/// A JSON-shaped value.
///
/// Numbers are kept in canonical form: integers that fit `i64` or `u64` are
/// exact, and integral floats within 2^53 are stored as integers so `3` and
/// `3.0` compare equal.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Builds an object value from key/value pairs.
    pub fn object<K, I>(pairs: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the empty object `{}`.
    pub fn empty_object() -> Value {
        Value::Object(Object::new())
    }

    /// Returns the JSON kind name, used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns true for numbers held as exact integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_i64() || n.is_u64())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a top-level field of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Overwrites top-level keys of `self` with those of `patch`.
    ///
    /// Nested objects are replaced wholesale, not merged. Does nothing unless
    /// both sides are objects.
    pub fn shallow_merge(&mut self, patch: &Value) {
        if let (Value::Object(base), Value::Object(patch)) = (self, patch) {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
    }

    /// Renders the value as compact JSON text.
    pub fn to_json_string(&self) -> String {
        serde_json::Value::from(self).to_string()
    }

    /// Parses JSON text into a value.
    pub fn from_json_str(s: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(s).map(Value::from)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(canonical(n)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Largest integer magnitude an f64 represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Stores integral floats within 2^53 as integers; everything else as is.
fn canonical(n: Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
            Number::from(f as i64)
        }
        _ => n,
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        serde_json::Value::from(&v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Non-finite floats have no JSON form and become `Null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, |n| Value::Number(canonical(n)))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_integers_stay_integers() {
        let v = Value::object([("count", Value::from(5)), ("ratio", Value::from(0.5))]);
        assert_eq!(v.to_json_string(), r#"{"count":5,"ratio":0.5}"#);
    }

    #[test]
    fn test_large_integers_are_exact() {
        let v = Value::from_json_str(r#"{"balance":9007199254740993,"big":12345678901234567891}"#)
            .unwrap();
        assert_eq!(v.get("balance").and_then(Value::as_i64), Some(9_007_199_254_740_993));
        assert!(v.get("big").unwrap().is_integer());
        assert_eq!(
            v.to_json_string(),
            r#"{"balance":9007199254740993,"big":12345678901234567891}"#
        );
    }

    #[test]
    fn test_integral_floats_equal_integers() {
        assert_eq!(Value::from_json_str("3.0").unwrap(), Value::from(3));
        assert_eq!(Value::from(3.0), Value::from(3));
        assert_eq!(Value::from(-2.0).to_json_string(), "-2");
        assert_eq!(Value::from(2.5).to_json_string(), "2.5");
        assert!(!Value::from(2.5).is_integer());
        assert_eq!(Value::from(f64::NAN), Value::Null);
    }

    #[test]
    fn test_object_keys_sorted() {
        let v = Value::from_json_str(r#"{"b":1,"a":2}"#).unwrap();
        assert_eq!(v.to_json_string(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_shallow_merge_replaces_nested() {
        let mut base = Value::from_json_str(r#"{"title":"x","meta":{"a":1,"b":2}}"#).unwrap();
        let patch = Value::from_json_str(r#"{"meta":{"a":3}}"#).unwrap();
        base.shallow_merge(&patch);
        assert_eq!(base.to_json_string(), r#"{"meta":{"a":3},"title":"x"}"#);
    }

    #[test]
    fn test_shallow_merge_ignores_non_object_patch() {
        let mut base = Value::object([("a", Value::from(1))]);
        base.shallow_merge(&Value::from("nope"));
        assert_eq!(base, Value::object([("a", Value::from(1))]));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::from(true).kind(), "boolean");
        assert_eq!(Value::from(1).kind(), "number");
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::Array(vec![]).kind(), "array");
        assert_eq!(Value::empty_object().kind(), "object");
    }

    #[test]
    fn test_serde_through_json() {
        let v: Value = serde_json::from_str(r#"[1, "two", null, {"x": true}]"#).unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::from(1),
                Value::from("two"),
                Value::Null,
                Value::object([("x", Value::from(true))]),
            ])
        );
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[1,"two",null,{"x":true}]"#);
    }
}
