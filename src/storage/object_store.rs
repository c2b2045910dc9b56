//! Object stores: upload a local artifact under a key derived from its filename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Public URL prefix used when none is configured.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";

/// Errors raised by an object store upload.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The local path has no usable file name.
    #[error("cannot derive object name from {path}")]
    MissingFileName {
        /// The offending path.
        path: PathBuf,
    },

    /// Reading the local artifact or writing the stored copy failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The upload request could not be sent.
    #[error("upload request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The storage service rejected the upload.
    #[error("upload rejected with HTTP {status}: {message}")]
    Rejected {
        /// HTTP status returned by the service.
        status: u16,
        /// Response body (truncated).
        message: String,
    },
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    /// Object key (the artifact's file name).
    pub filename: String,
    /// Publicly reachable URL of the object.
    pub public_url: String,
}

/// Durable artifact storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local` into `bucket` under its file name.
    async fn upload(&self, bucket: &str, local: &Path) -> Result<UploadedObject, StorageError>;
}

fn object_name(local: &Path) -> Result<String, StorageError> {
    local
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StorageError::MissingFileName {
            path: local.to_path_buf(),
        })
}

fn public_url(base: &str, bucket: &str, filename: &str) -> String {
    format!(
        "{}/{bucket}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(filename)
    )
}

fn content_type_for(local: &Path) -> &'static str {
    match local.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => "application/pdf",
        Some(ext) if ext.eq_ignore_ascii_case("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Stores objects as files under `{root}/{bucket}/{filename}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root` that reports URLs under `public_base_url`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, local), fields(path = %local.display()))]
    async fn upload(&self, bucket: &str, local: &Path) -> Result<UploadedObject, StorageError> {
        let filename = object_name(local)?;
        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        let destination = dir.join(&filename);
        tokio::fs::copy(local, &destination)
            .await
            .map_err(|e| StorageError::io(local, e))?;

        let public_url = public_url(&self.public_base_url, bucket, &filename);
        info!(filename = %filename, bucket, "stored artifact");
        Ok(UploadedObject {
            filename,
            public_url,
        })
    }
}

/// Uploads through the GCS JSON API media endpoint.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    public_base_url: String,
    token: Option<String>,
}

impl GcsObjectStore {
    /// Creates a store posting to `endpoint` (e.g. `https://storage.googleapis.com`).
    #[must_use]
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        public_base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            public_base_url: public_base_url.into(),
            token,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip(self, local), fields(path = %local.display()))]
    async fn upload(&self, bucket: &str, local: &Path) -> Result<UploadedObject, StorageError> {
        let filename = object_name(local)?;
        let body = tokio::fs::read(local)
            .await
            .map_err(|e| StorageError::io(local, e))?;

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(bucket),
            urlencoding::encode(&filename)
        );
        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, content_type_for(local))
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(200).collect();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(filename = %filename, %status, "upload accepted");
        Ok(UploadedObject {
            public_url: public_url(&self.public_base_url, bucket, &filename),
            filename,
        })
    }
}
