//! Upload storage.
//!
//! Files land in `<root>/<category>/<prefix>_<millis>[_<index>]<ext>` and are
//! served back under `/uploads/<category>/<name>`.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use thiserror::Error;
use twinrpc_core::{ProcedureError, Value};
use twinrpc_server::UPLOADS_PREFIX;

/// Errors raised while storing an upload.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The file data is not valid base64.
    #[error("file data is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Writing the file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<UploadError> for ProcedureError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidBase64(_) => ProcedureError::bad_request(err.to_string()),
            UploadError::Io { .. } => {
                ProcedureError::internal_with_source("failed to store upload", err)
            }
        }
    }
}

/// Upload directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// User avatars.
    Avatars,
    /// Post attachments.
    Attachments,
    /// Single binary files attached to a post.
    Files,
    /// Unattached binary blobs.
    Binary,
    /// Post images.
    Images,
}

impl Category {
    /// Directory name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::Attachments => "attachments",
            Self::Files => "files",
            Self::Binary => "binary",
            Self::Images => "images",
        }
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated file name.
    pub file_name: String,
    /// URL path the file is served under.
    pub file_path: String,
    /// Size in bytes.
    pub size: usize,
}

impl From<&StoredFile> for Value {
    fn from(file: &StoredFile) -> Self {
        Value::object([
            ("fileName", Value::from(file.file_name.as_str())),
            ("filePath", Value::from(file.file_path.as_str())),
            ("size", Value::from(file.size)),
        ])
    }
}

/// How to name a stored file.
#[derive(Debug, Clone, Copy)]
pub struct FileName<'a> {
    /// Leading part, e.g. `post_1`.
    pub prefix: &'a str,
    /// Extension including the dot, or empty.
    pub extension: &'a str,
    /// Position within a multi-file upload.
    pub index: Option<usize>,
}

impl FileName<'_> {
    fn render(&self, millis: i64) -> String {
        match self.index {
            Some(i) => format!("{}_{millis}_{i}{}", self.prefix, self.extension),
            None => format!("{}_{millis}{}", self.prefix, self.extension),
        }
    }
}

/// Writes uploads below one root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Stores files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under a generated name, creating the category
    /// directory on demand.
    pub async fn save(
        &self,
        category: Category,
        name: FileName<'_>,
        bytes: &[u8],
    ) -> Result<StoredFile, UploadError> {
        let dir = self.root.join(category.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| UploadError::Io {
                path: dir.clone(),
                source,
            })?;

        let file_name = name.render(Utc::now().timestamp_millis());
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            category = category.as_str(),
            file = %file_name,
            size = bytes.len(),
            "stored upload"
        );
        Ok(StoredFile {
            file_path: format!("{UPLOADS_PREFIX}/{}/{file_name}", category.as_str()),
            file_name,
            size: bytes.len(),
        })
    }

    /// Decodes base64 data and stores it.
    pub async fn save_base64(
        &self,
        category: Category,
        name: FileName<'_>,
        data: &str,
    ) -> Result<StoredFile, UploadError> {
        let bytes = decode_base64(data)?;
        self.save(category, name, &bytes).await
    }
}

/// Decodes standard base64, accepting an optional `data:<mime>;base64,`
/// prefix and embedded whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, UploadError> {
    let payload = data
        .split_once(";base64,")
        .filter(|(head, _)| head.starts_with("data:"))
        .map_or(data, |(_, body)| body);
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// The extension of a client file name, including the dot.
pub fn extension_of(file_name: &str) -> &str {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(i) => &base[i..],
    }
}
