//! File storage: attachments kept in a [`BlobStore`] and handed out as
//! download URLs.
//!
//! ## Layout
//!
//! * `beneficiaries/{id}/{documentType}/{filename}`: application attachments
//! * `projects/{id}/progress/{timestamp}_{index}_{filename}`: progress photos
//!
//! Batch uploads run concurrently and fail as a whole on the first error.
//! Files that were already written stay in storage.

mod fs;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::errors::{ReliefError, Result};

pub use fs::FsBlobStore;

/// Upload granularity; progress is reported once per chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Write `data` to `path`, calling `on_progress` with the running byte
    /// count after each chunk lands.
    async fn put(&self, path: &str, data: &[u8], on_progress: &mut (dyn FnMut(u64) + Send)) -> Result<()>;

    /// `None` when nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Paths of the files directly inside `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// An attachment as received from a client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub document_type: String,
    pub url: String,
}

/// Progress notifications of a single upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    /// Percentage in `0.0..=100.0`, never decreasing.
    Percent(f64),
    Failed(String),
}

/// Handle on an upload running in the background. Both channels fail
/// together when the transfer fails.
pub struct UploadTask {
    pub progress: mpsc::UnboundedReceiver<UploadProgress>,
    pub download_url: oneshot::Receiver<Result<String>>,
}

#[derive(Clone)]
pub struct StorageService {
    blobs: Arc<dyn BlobStore>,
    public_base_url: String,
}

impl StorageService {
    pub fn new(blobs: Arc<dyn BlobStore>, public_base_url: &str) -> Self {
        Self {
            blobs,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Store a file and return its download URL.
    pub async fn upload_file(&self, path: &str, file: &UploadFile) -> Result<String> {
        let path = normalize_path(path)?;
        self.blobs.put(&path, &file.bytes, &mut |_| {}).await?;
        info!(%path, bytes = file.bytes.len(), "file uploaded");
        Ok(self.url_for(&path))
    }

    pub fn upload_file_with_progress(&self, path: &str, file: UploadFile) -> UploadTask {
        let (progress_tx, progress) = mpsc::unbounded_channel();
        let (url_tx, download_url) = oneshot::channel();
        let this = self.clone();
        let path = path.to_string();

        tokio::spawn(async move {
            let total = file.bytes.len() as u64;
            let result = match normalize_path(&path) {
                Ok(path) => {
                    let _ = progress_tx.send(UploadProgress::Percent(0.0));
                    let mut report = |written: u64| {
                        let pct = if total == 0 {
                            100.0
                        } else {
                            (written as f64 / total as f64) * 100.0
                        };
                        let _ = progress_tx.send(UploadProgress::Percent(pct.min(100.0)));
                    };
                    this.blobs
                        .put(&path, &file.bytes, &mut report)
                        .await
                        .map(|()| this.url_for(&path))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(url) => {
                    let _ = progress_tx.send(UploadProgress::Percent(100.0));
                    let _ = url_tx.send(Ok(url));
                }
                Err(e) => {
                    error!("upload of {path} failed: {e}");
                    let _ = progress_tx.send(UploadProgress::Failed(e.to_string()));
                    let _ = url_tx.send(Err(e));
                }
            }
        });

        UploadTask {
            progress,
            download_url,
        }
    }

    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        self.blobs.delete(&path).await?;
        info!(%path, "file deleted");
        Ok(())
    }

    /// Fails with `NotFound` when nothing is stored at `path`.
    pub async fn get_download_url(&self, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        if !self.blobs.exists(&path).await? {
            return Err(ReliefError::not_found("files", &path));
        }
        Ok(self.url_for(&path))
    }

    /// Download URLs of every file directly inside `path`.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path)?;
        let items = self.blobs.list(&path).await?;
        Ok(items.iter().map(|p| self.url_for(p)).collect())
    }

    /// Lists then deletes every file directly inside `path`. Not atomic: a
    /// failure part-way leaves the earlier files deleted.
    pub async fn delete_directory(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let items = self.blobs.list(&path).await?;
        try_join_all(items.iter().map(|item| self.blobs.delete(item))).await?;
        info!(%path, count = items.len(), "directory cleared");
        Ok(())
    }

    /// Upload every `(documentType, file)` pair for one application.
    pub async fn upload_beneficiary_documents(
        &self,
        beneficiary_id: &str,
        files: &[(String, UploadFile)],
    ) -> Result<Vec<UploadedDocument>> {
        let uploads = files.iter().map(|(document_type, file)| async move {
            let path = format!(
                "beneficiaries/{beneficiary_id}/{}/{}",
                sanitize_segment(document_type),
                sanitize_segment(&file.name)
            );
            let url = self.upload_file(&path, file).await?;
            Ok::<_, ReliefError>(UploadedDocument {
                document_type: document_type.clone(),
                url,
            })
        });
        try_join_all(uploads).await.inspect_err(|e| {
            warn!(%beneficiary_id, "attachment batch failed: {e}");
        })
    }

    pub async fn upload_project_photos(&self, project_id: &str, photos: &[UploadFile]) -> Result<Vec<String>> {
        let stamp = Utc::now().timestamp_millis();
        let uploads = photos.iter().enumerate().map(|(index, photo)| {
            let path = format!(
                "projects/{project_id}/progress/{stamp}_{index}_{}",
                sanitize_segment(&photo.name)
            );
            async move { self.upload_file(&path, photo).await }
        });
        try_join_all(uploads).await
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/files/{path}", self.public_base_url)
    }
}

/// Validate a storage path: relative, `/`-separated, no empty, `.` or `..`
/// segments.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ReliefError::Storage("storage path is empty".to_string()));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(ReliefError::Storage(format!("storage path must be relative: {path}")));
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ReliefError::Storage(format!("invalid storage path: {path}")));
        }
    }
    Ok(trimmed.to_string())
}

/// Make a client-supplied name safe to embed as one path segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
