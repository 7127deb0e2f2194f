//! Serves stored uploads under `/uploads`.
//!
//! Only `GET` and `HEAD` are allowed. Paths containing `..` or hidden
//! segments are refused before the filesystem is touched.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http::{Method, StatusCode};
use thiserror::Error;

use crate::response::{self, HttpResponse};

/// Errors that can occur when serving a file.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The path tries to leave the root or names a hidden file.
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Not a `GET` or `HEAD`.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Reading failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StaticFileError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A read-only view of one directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serves files below `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The served directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serves `request_path` (relative to the root) and renders failures as
    /// JSON errors.
    pub async fn serve(&self, request_path: &str, method: &Method) -> HttpResponse {
        match self.handle(request_path, method).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(path = %request_path, error = %e, "static file not served");
                response::json(
                    e.status_code(),
                    &serde_json::json!({ "error": e.to_string(), "path": request_path }),
                )
            }
        }
    }

    /// Serves one file.
    pub async fn handle(
        &self,
        request_path: &str,
        method: &Method,
    ) -> Result<HttpResponse, StaticFileError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed);
        }

        let path = self.resolve_path(request_path)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StaticFileError::NotFound(request_path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(content)
        };
        Ok(response::bytes(StatusCode::OK, detect_mime_type(&path), body))
    }

    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(StaticFileError::NotFound(request_path.to_string()));
        }

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(name) => {
                    if name.to_str().is_some_and(|n| n.starts_with('.')) {
                        return Err(StaticFileError::Forbidden(
                            "Hidden files not allowed".to_string(),
                        ));
                    }
                }
                Component::CurDir => {}
                _ => {
                    return Err(StaticFileError::Forbidden(
                        "Directory traversal not allowed".to_string(),
                    ))
                }
            }
        }

        Ok(self.root.join(relative))
    }
}

fn detect_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, StaticFiles) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("avatars")).unwrap();
        std::fs::write(dir.path().join("avatars/avatar_1.png"), b"\x89PNG").unwrap();
        std::fs::write(dir.path().join(".secret"), b"x").unwrap();
        let files = StaticFiles::new(dir.path());
        (dir, files)
    }

    #[tokio::test]
    async fn test_serves_file_with_mime_type() {
        let (_dir, files) = fixture();
        let response = files
            .handle("/avatars/avatar_1.png", &Method::GET)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn test_refuses_traversal_and_hidden_files() {
        let (_dir, files) = fixture();
        assert!(matches!(
            files.handle("../etc/passwd", &Method::GET).await,
            Err(StaticFileError::Forbidden(_))
        ));
        assert!(matches!(
            files.handle(".secret", &Method::GET).await,
            Err(StaticFileError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_and_wrong_method() {
        let (_dir, files) = fixture();
        let response = files.serve("avatars/none.png", &Method::GET).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = files.serve("avatars/avatar_1.png", &Method::POST).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
