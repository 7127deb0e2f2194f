//! Request payload classification.
//!
//! Layers branch on what the body *is*, not on which procedure it targets:
//! JSON goes through the transformer and may be batched, anything else is
//! handed to a single procedure as [`Input::Form`] or [`Input::Binary`].

use bytes::Bytes;
use http::StatusCode;
use twinrpc_core::{kinds, BinaryInput, ErrorOutcome, FormData, FormFile, Input};

/// The shape of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/json`, any `+json` type, or no content type at all.
    Json,
    /// `multipart/form-data` with its boundary.
    Form(String),
    /// Anything else, passed through as bytes.
    Binary,
}

impl BodyKind {
    /// Classifies a `Content-Type` header value.
    ///
    /// A multipart type without a usable boundary is a `BAD_REQUEST`.
    pub fn classify(content_type: Option<&str>) -> Result<Self, ErrorOutcome> {
        let Some(raw) = content_type.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::Json);
        };
        let Ok(parsed) = raw.parse::<mime::Mime>() else {
            return Ok(Self::Binary);
        };

        if parsed.subtype() == mime::JSON || parsed.suffix() == Some(mime::JSON) {
            return Ok(Self::Json);
        }
        if parsed.type_() == mime::MULTIPART && parsed.subtype() == mime::FORM_DATA {
            return multer::parse_boundary(raw).map(Self::Form).map_err(|e| {
                ErrorOutcome::transport(
                    kinds::BAD_REQUEST,
                    StatusCode::BAD_REQUEST,
                    format!("invalid multipart content type: {e}"),
                )
            });
        }
        Ok(Self::Binary)
    }

    /// Returns true for the batching-capable JSON path.
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Parses a JSON body. An empty body reads as `null`.
pub fn parse_json(body: &[u8]) -> Result<serde_json::Value, ErrorOutcome> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        ErrorOutcome::transport(
            kinds::PARSE_ERROR,
            StatusCode::BAD_REQUEST,
            format!("request body is not valid JSON: {e}"),
        )
    })
}

/// Parses a query-string JSON parameter. A missing parameter reads as `null`.
pub fn parse_query_json(query: Option<&str>, key: &str) -> Result<serde_json::Value, ErrorOutcome> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|e| {
            ErrorOutcome::transport(
                kinds::BAD_REQUEST,
                StatusCode::BAD_REQUEST,
                format!("malformed query string: {e}"),
            )
        })?;
    match pairs.into_iter().find(|(k, _)| k == key) {
        Some((_, raw)) => serde_json::from_str(&raw).map_err(|e| {
            ErrorOutcome::transport(
                kinds::PARSE_ERROR,
                StatusCode::BAD_REQUEST,
                format!("query parameter `{key}` is not valid JSON: {e}"),
            )
        }),
        None => Ok(serde_json::Value::Null),
    }
}

/// Returns true if a query-string flag is set to `1` or `true`.
pub fn query_flag(query: Option<&str>, key: &str) -> bool {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query.unwrap_or_default())
        .map(|pairs| {
            pairs
                .iter()
                .any(|(k, v)| k == key && (v == "1" || v == "true"))
        })
        .unwrap_or(false)
}

/// Builds the unbatched input for a non-JSON body.
pub async fn read_direct(
    kind: BodyKind,
    body: Bytes,
    content_type: Option<String>,
) -> Result<Input, ErrorOutcome> {
    match kind {
        BodyKind::Form(boundary) => read_form(body, boundary).await.map(Input::Form),
        BodyKind::Binary | BodyKind::Json => Ok(Input::Binary(BinaryInput {
            bytes: body,
            content_type,
        })),
    }
}

/// Reads every part of a multipart body.
///
/// Parts with a file name become [`FormFile`]s; the rest must be UTF-8 text.
pub async fn read_form(body: Bytes, boundary: String) -> Result<FormData, ErrorOutcome> {
    let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = FormData::default();

    let bad = |e: multer::Error| {
        ErrorOutcome::transport(
            kinds::BAD_REQUEST,
            StatusCode::BAD_REQUEST,
            format!("malformed multipart body: {e}"),
        )
    };

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(ToString::to_string);

        if file_name.is_some() {
            let bytes = field.bytes().await.map_err(bad)?;
            form.files.push(FormFile {
                field: name,
                file_name,
                content_type,
                bytes,
            });
        } else {
            let text = field.text().await.map_err(bad)?;
            form.fields.insert(name, text);
        }
    }

    tracing::debug!(
        fields = form.fields.len(),
        files = form.files.len(),
        "parsed multipart form"
    );
    Ok(form)
}
