//! Tagged value type.
//!
//! [`Value`] is the currency of procedure outputs. Unlike
//! [`serde_json::Value`] it can carry timestamps, sets and maps with
//! non-string keys, which the [transformers](crate::transformer) then encode
//! into plain JSON plus type annotations.
//!
//! `Serialize` uses the *plain* projection: dates become RFC 3339 strings,
//! sets become arrays and maps become arrays of `[key, value]` pairs. That
//! projection is lossy; use a transformer to keep the tags. Deserializing
//! from JSON reads plain values; deserializing from another [`Value`] (see
//! [`from_value`](crate::from_value)) keeps them tagged.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A JSON-like value with first-class dates, sets and maps.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// JSON `null`.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(serde_json::Number),
    /// A string.
    String(String),
    /// A UTC timestamp.
    Date(DateTime<Utc>),
    /// An ordered list.
    Array(Vec<Value>),
    /// A string-keyed object, in insertion order.
    Object(IndexMap<String, Value>),
    /// A set of unique members, in insertion order.
    Set(Vec<Value>),
    /// A map with arbitrary keys, in insertion order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Builds a set, dropping duplicate members.
    pub fn set<I, V>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut out: Vec<Value> = Vec::new();
        for member in members {
            let member = member.into();
            if !out.contains(&member) {
                out.push(member);
            }
        }
        Self::Set(out)
    }

    /// Builds a map; a repeated key replaces the earlier entry.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Self::Map(out)
    }

    /// Builds an object from string keys.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Converts any serializable type through its plain JSON form.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Returns the plain JSON projection of this value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(format_date(d)),
            Self::Array(items) | Self::Set(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Map(entries) => serde_json::Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| serde_json::Value::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
        }
    }

    /// Looks up a field of an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Looks up the value for a key of a map.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns the string slice if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is a number representable as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns the boolean if this is a bool.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a date.
    pub const fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the elements of an array or the members of a set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Formats a timestamp the way both wire formats expect it.
///
/// Whole milliseconds keep the fixed three digits JavaScript clients emit;
/// finer timestamps keep every digit so they decode to the same instant.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    let precision = if date.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::AutoSi
    };
    date.to_rfc3339_opts(precision, true)
}

#[allow(clippy::float_cmp)]
fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for Value {
    /// Sets compare by membership and maps by their key/value pairs; insertion
    /// order only matters for arrays.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => numbers_equal(a, b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|member| b.contains(member))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
            }
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number((n as u64).into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.serialize_str(&format_date(d)),
            Self::Array(items) | Self::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Map(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (k, v) in entries {
                    seq.serialize_element(&(k, v))?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_set_drops_duplicates() {
        let set = Value::set(["a", "b", "a"]);
        assert_eq!(set.as_slice().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_set_equality_ignores_order() {
        assert_eq!(Value::set(["a", "b"]), Value::set(["b", "a"]));
        assert_ne!(Value::set(["a", "b"]), Value::set(["a"]));
        assert_ne!(
            Value::Array(vec!["a".into(), "b".into()]),
            Value::Array(vec!["b".into(), "a".into()])
        );
    }

    #[test]
    fn test_map_equality_and_replacement() {
        let a = Value::map([("k", 1_i64), ("j", 2_i64), ("k", 3_i64)]);
        let b = Value::map([("j", 2_i64), ("k", 3_i64)]);
        assert_eq!(a, b);
        assert_eq!(a.map_get(&"k".into()), Some(&Value::from(3_i64)));
    }

    #[test]
    fn test_numbers_compare_by_magnitude() {
        assert_eq!(Value::from(1_i64), Value::from(1.0));
        assert_ne!(Value::from(1_i64), Value::from(1.5));
    }

    #[test]
    fn test_plain_projection() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let value = Value::object([
            ("ts", Value::from(ts)),
            ("tags", Value::set(["a"])),
            ("meta", Value::map([("k", 1_i64)])),
        ]);

        assert_eq!(
            value.to_json(),
            json!({
                "ts": "2023-12-01T00:00:00.000Z",
                "tags": ["a"],
                "meta": [["k", 1]],
            })
        );
        assert_eq!(serde_json::to_value(&value).unwrap(), value.to_json());
    }

    #[test]
    fn test_sub_millisecond_dates_keep_their_digits() {
        let whole = Utc.timestamp_nanos(1_700_000_000_123_000_000);
        assert_eq!(format_date(&whole), "2023-11-14T22:13:20.123Z");
        let micros = Utc.timestamp_nanos(1_700_000_000_123_456_000);
        assert_eq!(format_date(&micros), "2023-11-14T22:13:20.123456Z");
        let nanos = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        assert_eq!(format_date(&nanos), "2023-11-14T22:13:20.123456789Z");
    }

    #[test]
    fn test_deserialize_plain_json() {
        let value: Value = serde_json::from_str(r#"{"a":[1,"x",null],"b":true}"#).unwrap();
        assert_eq!(value.get("b").and_then(Value::as_bool), Some(true));
        assert_eq!(value.get("a").and_then(Value::as_slice).map(<[Value]>::len), Some(3));
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert!(Value::from(f64::NAN).is_null());
    }

    #[test]
    fn test_from_serialize() {
        #[derive(Serialize)]
        struct Page {
            page: u32,
            total: u32,
        }
        let value = Value::from_serialize(&Page { page: 1, total: 7 }).unwrap();
        assert_eq!(value.get("total").and_then(Value::as_i64), Some(7));
    }
}
