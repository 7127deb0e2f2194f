//! Deserializing Rust types straight from a tagged [`Value`].
//!
//! Ordinary fields see the plain projection: dates arrive as RFC 3339
//! strings, sets as sequences and maps as sequences of `[key, value]` pairs.
//! A field typed as [`Value`] instead receives the tagged value itself, so
//! dates, sets and maps nested in free-form input keep their type.
//!
//! ```
//! use indexmap::IndexMap;
//! use twinrpc_core::{from_value, Value};
//!
//! #[derive(serde::Deserialize)]
//! struct Update {
//!     id: u64,
//!     metadata: IndexMap<String, Value>,
//! }
//!
//! let input = Value::object([
//!     ("id", Value::from(7_i64)),
//!     ("metadata", Value::object([("labels", Value::set(["a", "b"]))])),
//! ]);
//! let update: Update = from_value(input).unwrap();
//! assert_eq!(update.id, 7);
//! assert_eq!(update.metadata["labels"], Value::set(["a", "b"]));
//! ```

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor,
};
use serde::{forward_to_deserialize_any, Deserialize, Deserializer};
use serde_json::Error;

use crate::transformer::{CompactMetaTransformer, Transformer};
use crate::value::{format_date, Value};

/// Newtype name a [`Value`] asks for so this deserializer can hand over the
/// tagged form instead of the projection.
const TAGGED_TOKEN: &str = "$twinrpc::private::TaggedValue";

/// Deserializes `T` from a tagged value.
///
/// # Errors
///
/// Returns an error when the value does not have the shape `T` expects.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    T::deserialize(value)
}

impl<'de> Deserializer<'de> for Value {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self {
            Self::Null => visitor.visit_unit(),
            Self::Bool(b) => visitor.visit_bool(b),
            Self::Number(n) => n.deserialize_any(visitor),
            Self::String(s) => visitor.visit_string(s),
            Self::Date(d) => visitor.visit_string(format_date(&d)),
            Self::Array(items) | Self::Set(items) => visit_items(items, visitor),
            Self::Object(fields) => {
                let mut map = de::value::MapDeserializer::<_, Error>::new(fields.into_iter());
                let out = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(out)
            }
            Self::Map(entries) => visit_items(
                entries
                    .into_iter()
                    .map(|(k, v)| Self::Array(vec![k, v]))
                    .collect(),
                visitor,
            ),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self {
            Self::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        if name == TAGGED_TOKEN {
            visitor.visit_map(TaggedAccess(Some(self)))
        } else {
            visitor.visit_newtype_struct(self)
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self {
            Self::String(variant) => visitor.visit_enum(variant.into_deserializer()),
            _ => Err(de::Error::custom(format!(
                "expected one of the {name} variants {variants:?}"
            ))),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

impl IntoDeserializer<'_, Error> for Value {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

fn visit_items<'de, V: Visitor<'de>>(items: Vec<Value>, visitor: V) -> Result<V::Value, Error> {
    let mut seq = de::value::SeqDeserializer::<_, Error>::new(items.into_iter());
    let out = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(out)
}

/// One-entry map carrying a value in compact envelope form.
struct TaggedAccess(Option<Value>);

impl<'de> MapAccess<'de> for TaggedAccess {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        if self.0.is_none() {
            return Ok(None);
        }
        seed.deserialize(TAGGED_TOKEN.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let value = self
            .0
            .take()
            .ok_or_else(|| <Error as de::Error>::custom("tagged value read twice"))?;
        seed.deserialize(CompactMetaTransformer::new().encode(&value))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(TAGGED_TOKEN, ValueVisitor)
    }
}

/// Builds a [`Value`] from whatever the deserializer presents.
struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::from(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        Ok(Value::Number(n.into()))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Value, E> {
        Ok(Value::from(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let Some(first) = map.next_key::<String>()? else {
            return Ok(Value::Object(indexmap::IndexMap::new()));
        };
        if first == TAGGED_TOKEN {
            let envelope: serde_json::Value = map.next_value()?;
            return CompactMetaTransformer::new()
                .decode(envelope)
                .map_err(de::Error::custom);
        }

        let mut fields = indexmap::IndexMap::new();
        fields.insert(first, map.next_value()?);
        while let Some((key, value)) = map.next_entry()? {
            fields.insert(key, value);
        }
        Ok(Value::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use indexmap::{IndexMap, IndexSet};
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Profile {
        name: String,
        joined_at: DateTime<Utc>,
        tags: IndexSet<String>,
        nickname: Option<String>,
        #[serde(default)]
        extra: IndexMap<String, Value>,
    }

    #[test]
    fn test_plain_fields_read_the_projection() {
        let joined = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        let input = Value::object([
            ("name", Value::from("John")),
            ("joinedAt", Value::from(joined)),
            ("tags", Value::set(["admin", "beta"])),
            ("nickname", Value::Null),
        ]);

        let profile: Profile = from_value(input).unwrap();
        assert_eq!(profile.name, "John");
        assert_eq!(profile.joined_at, joined);
        assert_eq!(profile.tags.len(), 2);
        assert!(profile.nickname.is_none());
        assert!(profile.extra.is_empty());
    }

    #[test]
    fn test_value_fields_keep_their_tags() {
        let seen = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let extra = Value::object([
            ("seenAt", Value::from(seen)),
            ("labels", Value::set(["x", "y"])),
            ("scores", Value::map([(Value::from(1_i64), Value::from("gold"))])),
        ]);
        let input = Value::object([
            ("name", Value::from("Jane")),
            ("joinedAt", Value::from("2023-03-20T00:00:00.000Z")),
            ("tags", Value::Array(vec![])),
            ("extra", extra),
        ]);

        let profile: Profile = from_value(input).unwrap();
        assert_eq!(profile.extra["seenAt"], Value::from(seen));
        assert_eq!(profile.extra["labels"], Value::set(["y", "x"]));
        assert_eq!(
            profile.extra["scores"],
            Value::map([(Value::from(1_i64), Value::from("gold"))])
        );
    }

    #[test]
    fn test_shape_errors_are_reported() {
        let input = Value::object([("name", Value::from(5_i64))]);
        let err = from_value::<Profile>(input).unwrap_err().to_string();
        assert!(err.contains("invalid type"), "{err}");
    }

    #[test]
    fn test_unit_variants_read_from_strings() {
        #[derive(Debug, PartialEq, Deserialize)]
        #[serde(rename_all = "lowercase")]
        enum Kind {
            Avatar,
            Attachment,
        }
        assert_eq!(from_value::<Kind>(Value::from("avatar")).unwrap(), Kind::Avatar);
        assert_eq!(from_value::<Kind>(Value::from("attachment")).unwrap(), Kind::Attachment);
        assert!(from_value::<Kind>(Value::from(3_i64)).is_err());
    }

    #[test]
    fn test_plain_json_still_deserializes() {
        let value: Value = serde_json::from_value(json!({"a": [1, "x", null], "b": {"c": true}})).unwrap();
        assert_eq!(value.get("b").and_then(|b| b.get("c")), Some(&Value::Bool(true)));
    }
}
