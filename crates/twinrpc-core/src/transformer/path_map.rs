//! Path-map transformer used by the legacy layer.
//!
//! Annotations are a flat object from an escaped, dot-joined path to a tag
//! name. Dots and backslashes inside object keys are escaped with a
//! backslash. The root value has the empty path; a single empty top-level
//! key is written as a lone backslash so the two stay apart.

use super::{flatten, restore, Annotation, Segment, Tag, TransformError, Transformer};
use crate::value::Value;
use serde_json::json;

/// Encodes values as `{"json": .., "meta": {"values": {path: tag}}}`.
///
/// `meta` is omitted when the value carries no tagged nodes. Decoding also
/// accepts plain JSON without the `json` wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMapTransformer;

impl PathMapTransformer {
    /// Creates the transformer.
    pub const fn new() -> Self {
        Self
    }
}

const fn tag_name(tag: Tag) -> &'static str {
    match tag {
        Tag::Date => "Date",
        Tag::Set => "set",
        Tag::Map => "map",
    }
}

fn parse_tag(name: &str) -> Result<Tag, TransformError> {
    match name {
        "Date" => Ok(Tag::Date),
        "set" => Ok(Tag::Set),
        "map" => Ok(Tag::Map),
        other => Err(TransformError::UnknownTag(other.to_string())),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('\\', "\\\\").replace('.', "\\.")
}

/// Path of the empty top-level key.
const EMPTY_KEY_PATH: &str = "\\";

fn join_path(path: &[Segment]) -> String {
    let joined = path
        .iter()
        .map(|segment| match segment {
            Segment::Key(k) => escape(k),
            Segment::Index(i) => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".");
    if joined.is_empty() && !path.is_empty() {
        return EMPTY_KEY_PATH.to_string();
    }
    joined
}

fn split_path(raw: &str) -> Vec<Segment> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '.' => segments.push(Segment::Key(std::mem::take(&mut current))),
            other => current.push(other),
        }
    }
    segments.push(Segment::Key(current));
    segments
}

/// Splits a payload into its `json` and `meta` parts if it is wrapped.
pub(super) fn unwrap_envelope(
    payload: serde_json::Value,
) -> (serde_json::Value, Option<serde_json::Value>) {
    match payload {
        serde_json::Value::Object(mut fields)
            if fields.contains_key("json")
                && fields.keys().all(|k| k == "json" || k == "meta") =>
        {
            let json = fields.remove("json").unwrap_or_default();
            let meta = fields.remove("meta");
            (json, meta)
        }
        other => (other, None),
    }
}

impl Transformer for PathMapTransformer {
    fn name(&self) -> &'static str {
        "path-map"
    }

    fn encode(&self, value: &Value) -> serde_json::Value {
        let mut annotations = Vec::new();
        let json = flatten(value, &mut Vec::new(), &mut annotations);
        if annotations.is_empty() {
            return json!({ "json": json });
        }
        let values: serde_json::Map<String, serde_json::Value> = annotations
            .iter()
            .map(|(path, tag)| (join_path(path), json!(tag_name(*tag))))
            .collect();
        json!({ "json": json, "meta": { "values": values } })
    }

    fn decode(&self, payload: serde_json::Value) -> Result<Value, TransformError> {
        let (json, meta) = unwrap_envelope(payload);
        let annotations = match meta {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Object(mut meta)) => match meta.remove("values") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Object(values)) => values
                    .into_iter()
                    .map(|(path, tag)| {
                        let tag = tag.as_str().ok_or_else(|| {
                            TransformError::InvalidMeta(format!("tag for `{path}` is not a string"))
                        })?;
                        Ok::<Annotation, TransformError>((split_path(&path), parse_tag(tag)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => {
                    return Err(TransformError::InvalidMeta(
                        "`meta.values` must be an object".to_string(),
                    ))
                }
            },
            Some(_) => {
                return Err(TransformError::InvalidMeta(
                    "`meta` must be an object".to_string(),
                ))
            }
        };
        restore(json, annotations)
    }
}
