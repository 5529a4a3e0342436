//! Dynamic Value Model
//!
//! The engine instruments a JSON-like value tree rather than arbitrary Rust
//! structs. `Value` is the substrate: cheap-to-clone handles where objects
//! and arrays share their storage, so a value read out of the tree is a live
//! handle onto the same reactive data.
//!
//! # Change Detection
//!
//! Two comparisons live here and they are not the same thing:
//!
//! - [`Value::same_value`] is the write guard: identity for objects and
//!   arrays, content for strings, and NaN-equals-NaN for numbers. A write
//!   that is `same_value` to the stored value notifies nobody.
//!
//! - `PartialEq` is structural and exists for assertions and snapshots.
//!   It reads through containers without registering dependencies.
//!
//! # Interop
//!
//! `Value` converts from `serde_json::Value` for state ingestion and
//! serializes back out for snapshots. Serialization reads untracked.

use std::fmt::Debug;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::observe::{Arr, Obj};

/// A dynamic value in the reactive state tree.
///
/// Objects and arrays are reference handles: cloning a `Value` never deep
/// copies, and two clones of the same container observe each other's
/// mutations.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Object(Obj),
    Array(Arr),
}

impl Value {
    /// Build an empty reactive object value.
    pub fn object() -> Self {
        Value::Object(Obj::new())
    }

    /// Build an empty reactive array value.
    pub fn array() -> Self {
        Value::Array(Arr::new())
    }

    /// Whether this value is an object or an array.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arr> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The equality used by write guards and watcher change checks.
    ///
    /// Objects and arrays compare by identity (same shared storage),
    /// strings by content, and numbers with NaN equal to NaN so that a
    /// NaN-to-NaN write does not notify forever.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Convert to a plain `serde_json::Value`, reading untracked.
    ///
    /// Numbers that JSON cannot represent (NaN, infinities) become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Value::Array(arr) => serde_json::Value::Array(
                arr.snapshot().into_iter().map(|v| v.to_json()).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality, for assertions and snapshots. Containers fall
    /// back to identity first, then compare contents untracked.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(obj) => f.debug_tuple("Object").field(&obj.snapshot()).finish(),
            Value::Array(arr) => f.debug_tuple("Array").field(&arr.snapshot()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Value::Object(obj)
    }
}

impl From<Arr> for Value {
    fn from(arr: Arr) -> Self {
        Value::Array(arr)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(Arc::from(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::Array(Arr::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Obj::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(obj) => {
                let entries = obj.snapshot();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&key, &value)?;
                }
                map.end()
            }
            Value::Array(arr) => {
                let items = arr.snapshot();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&item)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_is_nan_aware() {
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(Value::Number(1.0).same_value(&Value::Number(1.0)));
        assert!(!Value::Number(1.0).same_value(&Value::Number(2.0)));
    }

    #[test]
    fn same_value_uses_identity_for_containers() {
        let a = Obj::from_entries([("x".to_string(), Value::from(1))]);
        let b = Obj::from_entries([("x".to_string(), Value::from(1))]);
        let va = Value::Object(a.clone());

        assert!(va.same_value(&Value::Object(a)));
        assert!(!va.same_value(&Value::Object(b)));
    }

    #[test]
    fn structural_equality_compares_contents() {
        let a: Value = json!({"x": 1, "items": [1, 2]}).into();
        let b: Value = json!({"x": 1, "items": [1, 2]}).into();
        let c: Value = json!({"x": 2, "items": [1, 2]}).into();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let source = json!({
            "name": "panel",
            "open": true,
            "count": 3.0,
            "tags": ["a", "b"],
            "nested": {"depth": 2.0}
        });
        let value: Value = source.clone().into();
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn clones_share_container_storage() {
        let obj = Obj::from_entries([("x".to_string(), Value::from(1))]);
        let v1 = Value::Object(obj.clone());
        let v2 = v1.clone();

        obj.set("x", Value::from(9));
        assert_eq!(v2.as_object().unwrap().get("x"), Value::from(9));
        let _ = v1;
    }
}
