//! Transport-safe values
//!
//! [`ResolvedValue`] is the only kind of value allowed to cross the channel. It
//! mirrors the primitive and structural JavaScript values (`undefined`, `null`,
//! strings, numbers, booleans, arrays and plain objects) and nothing else: no
//! pending values, no callables.
//!
//! # Wire Representation
//!
//! JSON cannot express `undefined` or non-finite numbers, so the serde form is
//! adjacently tagged:
//!
//! | Value | JSON |
//! |-------|------|
//! | `Undefined` | `{"type":"undefined"}` |
//! | `Null` | `{"type":"null"}` |
//! | `Number(2.0)` | `{"type":"number","value":2.0}` |
//! | `Number(NaN)` | `{"type":"number","value":"NaN"}` |
//! | `String("a")` | `{"type":"string","value":"a"}` |
//! | `Array([..])` | `{"type":"array","value":[..]}` |
//! | `Object({..})` | `{"type":"object","value":{..}}` |
//!
//! Conversions to and from plain `serde_json::Value` are provided for callers
//! that want ordinary JSON (the CLI), at the cost of losing `undefined` and
//! non-finite numbers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A fully resolved value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ResolvedValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(#[serde(with = "number_repr")] f64),
    String(String),
    Array(Vec<ResolvedValue>),
    Object(BTreeMap<String, ResolvedValue>),
}

impl ResolvedValue {
    /// Returns the JavaScript `typeof`-style name of this value.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedValue::Undefined => "undefined",
            ResolvedValue::Null => "null",
            ResolvedValue::Bool(_) => "boolean",
            ResolvedValue::Number(_) => "number",
            ResolvedValue::String(_) => "string",
            ResolvedValue::Array(_) => "array",
            ResolvedValue::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResolvedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResolvedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ResolvedValue]> {
        match self {
            ResolvedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ResolvedValue>> {
        match self {
            ResolvedValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ResolvedValue::Undefined)
    }

    /// Builds an object from `(key, value)` pairs.
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<ResolvedValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        ResolvedValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Converts plain JSON into a resolved value.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => ResolvedValue::Null,
            JsonValue::Bool(b) => ResolvedValue::Bool(b),
            JsonValue::Number(n) => ResolvedValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => ResolvedValue::String(s),
            JsonValue::Array(items) => {
                ResolvedValue::Array(items.into_iter().map(ResolvedValue::from_json).collect())
            }
            JsonValue::Object(fields) => ResolvedValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ResolvedValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts into plain JSON.
    ///
    /// Lossy: `undefined` and non-finite numbers become `null`, the same way
    /// `JSON.stringify` treats them inside arrays.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ResolvedValue::Undefined | ResolvedValue::Null => JsonValue::Null,
            ResolvedValue::Bool(b) => JsonValue::Bool(*b),
            ResolvedValue::Number(n) => number_to_json(*n),
            ResolvedValue::String(s) => JsonValue::String(s.clone()),
            ResolvedValue::Array(items) => {
                JsonValue::Array(items.iter().map(ResolvedValue::to_json).collect())
            }
            ResolvedValue::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    // Integral values print without a trailing `.0`
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::Number((n as i64).into());
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Structural equality where `NaN` equals `NaN`.
impl PartialEq for ResolvedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResolvedValue::Undefined, ResolvedValue::Undefined) => true,
            (ResolvedValue::Null, ResolvedValue::Null) => true,
            (ResolvedValue::Bool(a), ResolvedValue::Bool(b)) => a == b,
            (ResolvedValue::Number(a), ResolvedValue::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (ResolvedValue::String(a), ResolvedValue::String(b)) => a == b,
            (ResolvedValue::Array(a), ResolvedValue::Array(b)) => a == b,
            (ResolvedValue::Object(a), ResolvedValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Undefined => write!(f, "undefined"),
            ResolvedValue::Null => write!(f, "null"),
            ResolvedValue::Bool(b) => write!(f, "{}", b),
            ResolvedValue::Number(n) if n.is_nan() => write!(f, "NaN"),
            ResolvedValue::Number(n) if n.is_infinite() => {
                write!(f, "{}", if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            ResolvedValue::Number(n) => write!(f, "{}", n),
            ResolvedValue::String(s) => write!(f, "{}", s),
            ResolvedValue::Array(_) | ResolvedValue::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<()> for ResolvedValue {
    fn from(_: ()) -> Self {
        ResolvedValue::Undefined
    }
}

impl From<bool> for ResolvedValue {
    fn from(b: bool) -> Self {
        ResolvedValue::Bool(b)
    }
}

impl From<f64> for ResolvedValue {
    fn from(n: f64) -> Self {
        ResolvedValue::Number(n)
    }
}

impl From<i32> for ResolvedValue {
    fn from(n: i32) -> Self {
        ResolvedValue::Number(n.into())
    }
}

impl From<&str> for ResolvedValue {
    fn from(s: &str) -> Self {
        ResolvedValue::String(s.to_string())
    }
}

impl From<String> for ResolvedValue {
    fn from(s: String) -> Self {
        ResolvedValue::String(s)
    }
}

impl<T: Into<ResolvedValue>> From<Vec<T>> for ResolvedValue {
    fn from(items: Vec<T>) -> Self {
        ResolvedValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ResolvedValue>> From<Option<T>> for ResolvedValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ResolvedValue::Null)
    }
}

/// Serde helpers writing non-finite numbers as strings.
mod number_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if n.is_nan() {
            serializer.serialize_str("NaN")
        } else if n.is_infinite() {
            serializer.serialize_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*n)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Special(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Finite(n) => Ok(n),
            Repr::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid number representation '{}'",
                    other
                ))),
            },
        }
    }
}
