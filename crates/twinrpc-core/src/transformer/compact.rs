//! Compact meta transformer used by the contract layer.
//!
//! Annotations are an array of `[code, ...path]` entries where array indices
//! are numbers and object keys are strings.

use super::path_map::unwrap_envelope;
use super::{flatten, restore, Annotation, Segment, Tag, TransformError, Transformer};
use crate::value::Value;
use serde_json::json;

const CODE_DATE: u64 = 1;
const CODE_SET: u64 = 6;
const CODE_MAP: u64 = 7;

/// Encodes values as `{"json": .., "meta": [[code, ...path], ..]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactMetaTransformer;

impl CompactMetaTransformer {
    /// Creates the transformer.
    pub const fn new() -> Self {
        Self
    }
}

const fn code(tag: Tag) -> u64 {
    match tag {
        Tag::Date => CODE_DATE,
        Tag::Set => CODE_SET,
        Tag::Map => CODE_MAP,
    }
}

fn parse_entry(entry: serde_json::Value) -> Result<Annotation, TransformError> {
    let serde_json::Value::Array(parts) = entry else {
        return Err(TransformError::InvalidMeta(
            "meta entries must be arrays".to_string(),
        ));
    };
    let mut parts = parts.into_iter();
    let tag = match parts.next().as_ref().and_then(serde_json::Value::as_u64) {
        Some(CODE_DATE) => Tag::Date,
        Some(CODE_SET) => Tag::Set,
        Some(CODE_MAP) => Tag::Map,
        Some(other) => return Err(TransformError::UnknownTag(other.to_string())),
        None => {
            return Err(TransformError::InvalidMeta(
                "meta entry must start with a numeric type code".to_string(),
            ))
        }
    };
    let path = parts
        .map(|part| match part {
            serde_json::Value::String(key) => Ok(Segment::Key(key)),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|i| Segment::Index(i as usize))
                .ok_or_else(|| TransformError::InvalidMeta(format!("bad index `{n}`"))),
            other => Err(TransformError::InvalidMeta(format!(
                "bad path segment `{other}`"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((path, tag))
}

impl Transformer for CompactMetaTransformer {
    fn name(&self) -> &'static str {
        "compact-meta"
    }

    fn encode(&self, value: &Value) -> serde_json::Value {
        let mut annotations = Vec::new();
        let json = flatten(value, &mut Vec::new(), &mut annotations);
        let meta: Vec<serde_json::Value> = annotations
            .into_iter()
            .map(|(path, tag)| {
                let mut entry = vec![json!(code(tag))];
                entry.extend(path.into_iter().map(|segment| match segment {
                    Segment::Key(k) => json!(k),
                    Segment::Index(i) => json!(i),
                }));
                serde_json::Value::Array(entry)
            })
            .collect();
        json!({ "json": json, "meta": meta })
    }

    fn decode(&self, payload: serde_json::Value) -> Result<Value, TransformError> {
        let (json, meta) = unwrap_envelope(payload);
        let annotations = match meta {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(entries)) => entries
                .into_iter()
                .map(parse_entry)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(TransformError::InvalidMeta(
                    "`meta` must be an array".to_string(),
                ))
            }
        };
        restore(json, annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_encode_sample() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let value = Value::object([
            ("ts", Value::from(ts)),
            ("tags", Value::set(["a", "b"])),
            ("meta", Value::map([("k", 1_i64)])),
        ]);

        let encoded = CompactMetaTransformer.encode(&value);
        assert_eq!(encoded["meta"], json!([[1, "ts"], [6, "tags"], [7, "meta"]]));
        assert_eq!(CompactMetaTransformer.decode(encoded).unwrap(), value);
    }

    #[test]
    fn test_indices_are_numbers() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let value = Value::Array(vec![Value::Null, Value::from(ts)]);
        let encoded = CompactMetaTransformer.encode(&value);
        assert_eq!(encoded["meta"], json!([[1, 1]]));
    }

    #[test]
    fn test_plain_value_has_empty_meta() {
        let encoded = CompactMetaTransformer.encode(&Value::from("hi"));
        assert_eq!(encoded, json!({ "json": "hi", "meta": [] }));
    }

    #[test]
    fn test_unknown_code_rejected() {
        let payload = json!({ "json": 1, "meta": [[0]] });
        assert_eq!(
            CompactMetaTransformer.decode(payload).unwrap_err(),
            TransformError::UnknownTag("0".to_string())
        );
    }

    #[test]
    fn test_malformed_meta_rejected() {
        let payload = json!({ "json": 1, "meta": {"values": {}} });
        assert!(matches!(
            CompactMetaTransformer.decode(payload),
            Err(TransformError::InvalidMeta(_))
        ));
    }
}
