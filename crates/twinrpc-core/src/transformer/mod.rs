//! Wire transformers.
//!
//! A transformer turns a [`Value`] into plain JSON plus a list of type
//! annotations, and back. Both layers use the same tag vocabulary (date, set,
//! map); they only differ in how annotations are written:
//!
//! - [`PathMapTransformer`] (legacy layer): `{"json": .., "meta": {"values": {"a.b": "Date"}}}`
//! - [`CompactMetaTransformer`] (contract layer): `{"json": .., "meta": [[1, "a", "b"]]}`
//!
//! Decoding applies annotations deepest-first, so children are converted
//! before their containers regardless of the order annotations arrive in.

mod compact;
mod path_map;

pub use compact::CompactMetaTransformer;
pub use path_map::PathMapTransformer;

use crate::value::Value;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced while decoding a transformed payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The `meta` section has an unexpected shape.
    #[error("invalid meta: {0}")]
    InvalidMeta(String),

    /// An annotation names a type tag this transformer does not know.
    #[error("unknown type tag `{0}`")]
    UnknownTag(String),

    /// An annotation points at a path that does not exist.
    #[error("annotation path `{0}` does not exist")]
    MissingPath(String),

    /// The value at an annotated path has the wrong JSON shape.
    #[error("value at `{path}` cannot be read as {expected}")]
    TypeMismatch {
        /// Path of the offending value.
        path: String,
        /// Tag that was being applied.
        expected: &'static str,
    },
}

/// Encodes and decodes [`Value`]s for one wire format.
pub trait Transformer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Encodes a value into its wire form.
    fn encode(&self, value: &Value) -> serde_json::Value;

    /// Decodes a wire payload back into a value.
    fn decode(&self, payload: serde_json::Value) -> Result<Value, TransformError>;
}

/// Type tags shared by both transformers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag {
    Date,
    Set,
    Map,
}

impl Tag {
    const fn describe(self) -> &'static str {
        match self {
            Self::Date => "a date",
            Self::Set => "a set",
            Self::Map => "a map",
        }
    }
}

/// One step of an annotation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn as_text(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(i) => i.to_string(),
        }
    }
}

pub(crate) type Annotation = (Vec<Segment>, Tag);

/// Converts a value to plain JSON, recording one annotation per tagged node.
///
/// Children are annotated before their container.
pub(crate) fn flatten(value: &Value, path: &mut Vec<Segment>, out: &mut Vec<Annotation>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => {
            out.push((path.clone(), Tag::Date));
            serde_json::Value::String(crate::value::format_date(d))
        }
        Value::Array(items) => serde_json::Value::Array(flatten_items(items, path, out)),
        Value::Set(items) => {
            let json = serde_json::Value::Array(flatten_items(items, path, out));
            out.push((path.clone(), Tag::Set));
            json
        }
        Value::Object(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (key, child) in fields {
                path.push(Segment::Key(key.clone()));
                map.insert(key.clone(), flatten(child, path, out));
                path.pop();
            }
            serde_json::Value::Object(map)
        }
        Value::Map(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (i, (key, child)) in entries.iter().enumerate() {
                path.push(Segment::Index(i));
                path.push(Segment::Index(0));
                let k = flatten(key, path, out);
                path.pop();
                path.push(Segment::Index(1));
                let v = flatten(child, path, out);
                path.pop();
                path.pop();
                pairs.push(serde_json::Value::Array(vec![k, v]));
            }
            out.push((path.clone(), Tag::Map));
            serde_json::Value::Array(pairs)
        }
    }
}

fn flatten_items(items: &[Value], path: &mut Vec<Segment>, out: &mut Vec<Annotation>) -> Vec<serde_json::Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            path.push(Segment::Index(i));
            let json = flatten(item, path, out);
            path.pop();
            json
        })
        .collect()
}

/// Rebuilds a tagged value from plain JSON and its annotations.
pub(crate) fn restore(json: serde_json::Value, mut annotations: Vec<Annotation>) -> Result<Value, TransformError> {
    let mut root = Value::from(json);
    annotations.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    for (path, tag) in annotations {
        let node = locate(&mut root, &path)?;
        let taken = std::mem::take(node);
        *node = convert(taken, tag, &path)?;
    }
    Ok(root)
}

fn display_path(path: &[Segment]) -> String {
    path.iter().map(Segment::as_text).collect::<Vec<_>>().join(".")
}

fn locate<'v>(root: &'v mut Value, path: &[Segment]) -> Result<&'v mut Value, TransformError> {
    let missing = |depth: usize| TransformError::MissingPath(display_path(&path[..=depth.min(path.len() - 1)]));
    let index_at = |depth: usize| -> Result<usize, TransformError> {
        match &path[depth] {
            Segment::Index(i) => Ok(*i),
            Segment::Key(k) => k.parse().map_err(|_| missing(depth)),
        }
    };

    let mut node = root;
    let mut depth = 0;
    while depth < path.len() {
        node = match node {
            Value::Object(fields) => {
                let key = path[depth].as_text();
                fields.get_mut(&key).ok_or_else(|| missing(depth))?
            }
            Value::Array(items) | Value::Set(items) => {
                let index = index_at(depth)?;
                items.get_mut(index).ok_or_else(|| missing(depth))?
            }
            // A map entry is addressed as `<entry>.<0|1>` (key or value).
            Value::Map(entries) => {
                let index = index_at(depth)?;
                if depth + 1 >= path.len() {
                    return Err(missing(depth));
                }
                depth += 1;
                let entry = entries.get_mut(index).ok_or_else(|| missing(depth))?;
                match index_at(depth)? {
                    0 => &mut entry.0,
                    1 => &mut entry.1,
                    _ => return Err(missing(depth)),
                }
            }
            _ => return Err(missing(depth)),
        };
        depth += 1;
    }
    Ok(node)
}

fn convert(value: Value, tag: Tag, path: &[Segment]) -> Result<Value, TransformError> {
    let mismatch = || TransformError::TypeMismatch {
        path: display_path(path),
        expected: tag.describe(),
    };
    match (tag, value) {
        (Tag::Date, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .map_err(|_| mismatch()),
        (Tag::Set, Value::Array(items)) => Ok(Value::Set(items)),
        (Tag::Map, Value::Array(items)) => items
            .into_iter()
            .map(|pair| match pair {
                Value::Array(kv) if kv.len() == 2 => {
                    let mut kv = kv.into_iter();
                    match (kv.next(), kv.next()) {
                        (Some(k), Some(v)) => Ok((k, v)),
                        _ => Err(mismatch()),
                    }
                }
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Map),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Value {
        let ts = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        Value::object([
            ("ts", Value::from(ts)),
            ("tags", Value::set(["a", "b"])),
            ("meta", Value::map([("k", 1_i64)])),
        ])
    }

    #[test]
    fn test_flatten_annotates_children_before_containers() {
        let value = Value::set([Value::from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())]);
        let mut out = Vec::new();
        flatten(&value, &mut Vec::new(), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], (vec![Segment::Index(0)], Tag::Date));
        assert_eq!(out[1], (vec![], Tag::Set));
    }

    #[test]
    fn test_restore_is_order_independent() {
        let value = Value::map([(Value::from("when"), Value::set([Value::from(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap())]))]);
        let mut annotations = Vec::new();
        let json = flatten(&value, &mut Vec::new(), &mut annotations);
        annotations.reverse();
        assert_eq!(restore(json, annotations).unwrap(), value);
    }

    #[test]
    fn test_restore_sample() {
        let value = sample();
        let mut annotations = Vec::new();
        let json = flatten(&value, &mut Vec::new(), &mut annotations);
        assert_eq!(restore(json, annotations).unwrap(), value);
    }

    #[test]
    fn test_bad_date_is_type_mismatch() {
        let json = serde_json::json!({"ts": "yesterday"});
        let err = restore(json, vec![(vec![Segment::Key("ts".into())], Tag::Date)]).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_path_is_reported() {
        let json = serde_json::json!({"a": 1});
        let err = restore(json, vec![(vec![Segment::Key("b".into())], Tag::Date)]).unwrap_err();
        assert_eq!(err, TransformError::MissingPath("b".to_string()));
    }
}
