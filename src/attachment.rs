//! Lazy attachment handles and the per-request manager that enforces size
//! caps and fetch timeouts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment not found: {0}")]
    NotFound(String),
    #[error("attachment exceeds the aggregate size cap")]
    TooLarge,
    #[error("fetching attachment timed out")]
    FetchTimeout,
    #[error("failed to read attachment: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
enum Source {
    Local { path: PathBuf },
    Remote { url: String },
    InMemory { bytes: Vec<u8> },
}

/// A lazy handle to binary content plus filename, media type, and declared
/// size (-1 i.e. `None` if unknown until materialized).
#[derive(Clone, Serialize, Deserialize)]
pub struct Attachment {
    source: Source,
    pub filename: String,
    pub media_type: String,
    declared_size: Option<u64>,
    #[serde(skip)]
    cache: Arc<OnceCell<Result<Vec<u8>, AttachmentError>>>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("declared_size", &self.declared_size)
            .finish()
    }
}

impl Attachment {
    pub fn from_local_path(path: impl Into<PathBuf>, filename: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            source: Source::Local { path: path.into() },
            filename: filename.into(),
            media_type: media_type.into(),
            declared_size: None,
            cache: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_remote_url(url: impl Into<String>, filename: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            source: Source::Remote { url: url.into() },
            filename: filename.into(),
            media_type: media_type.into(),
            declared_size: None,
            cache: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, filename: impl Into<String>, media_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            source: Source::InMemory { bytes },
            filename: filename.into(),
            media_type: media_type.into(),
            declared_size: Some(size),
            cache: Arc::new(OnceCell::new()),
        }
    }

    /// Declared size, or -1 (`None`) if unknown until materialized.
    pub fn size_hint(&self) -> Option<u64> {
        self.declared_size
    }

    /// Read the bytes, honoring `fetch_timeout` for remote variants. Cached
    /// for the lifetime of this handle (i.e. for one dispatch).
    pub async fn materialize(&self, fetch_timeout: Duration) -> Result<Vec<u8>, AttachmentError> {
        self.cache
            .get_or_init(|| async {
                match &self.source {
                    Source::InMemory { bytes } => Ok(bytes.clone()),
                    Source::Local { path } => tokio::fs::read(path)
                        .await
                        .map_err(|e| match e.kind() {
                            std::io::ErrorKind::NotFound => {
                                AttachmentError::NotFound(path.display().to_string())
                            }
                            _ => AttachmentError::Io(e.to_string()),
                        }),
                    Source::Remote { url } => {
                        let client = reqwest::Client::new();
                        let fetch = async {
                            let resp = client
                                .get(url)
                                .send()
                                .await
                                .map_err(|e| AttachmentError::Io(e.to_string()))?;
                            if !resp.status().is_success() {
                                return Err(AttachmentError::NotFound(url.clone()));
                            }
                            resp.bytes()
                                .await
                                .map(|b| b.to_vec())
                                .map_err(|e| AttachmentError::Io(e.to_string()))
                        };
                        match tokio::time::timeout(fetch_timeout, fetch).await {
                            Ok(result) => result,
                            Err(_) => Err(AttachmentError::FetchTimeout),
                        }
                    }
                }
            })
            .await
            .clone()
    }
}

/// Owns the per-request ordered list of attachments and enforces an
/// aggregate size cap. Single-writer from construction until dispatch
/// begins.
pub struct AttachmentManager {
    max_total_bytes: u64,
    fetch_timeout: Duration,
    attachments: Vec<Attachment>,
    total_known_bytes: u64,
}

impl AttachmentManager {
    pub fn new(max_total_bytes: u64, fetch_timeout: Duration) -> Self {
        Self {
            max_total_bytes,
            fetch_timeout,
            attachments: Vec::new(),
            total_known_bytes: 0,
        }
    }

    /// Add an attachment, rejecting it with `TooLarge` if its *declared*
    /// size (when known) would push the aggregate over the cap. Unknown
    /// sizes (remote, not yet materialized) are admitted optimistically;
    /// callers that need a hard pre-flight guarantee should materialize
    /// attachments before calling `add` for those sources.
    pub fn add(&mut self, attachment: Attachment) -> Result<(), AttachmentError> {
        if let Some(size) = attachment.size_hint() {
            if self.total_known_bytes + size > self.max_total_bytes {
                return Err(AttachmentError::TooLarge);
            }
            self.total_known_bytes += size;
        }
        self.attachments.push(attachment);
        Ok(())
    }

    /// Add a remote attachment after resolving its size via HEAD/GET-and-measure,
    /// so the aggregate cap can be enforced before acceptance even though the
    /// declared size was unknown at construction time.
    pub async fn add_checked(&mut self, attachment: Attachment) -> Result<(), AttachmentError> {
        if attachment.size_hint().is_some() {
            return self.add(attachment);
        }
        let bytes = attachment.materialize(self.fetch_timeout).await?;
        if self.total_known_bytes + bytes.len() as u64 > self.max_total_bytes {
            return Err(AttachmentError::TooLarge);
        }
        self.total_known_bytes += bytes.len() as u64;
        self.attachments.push(attachment);
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn into_attachments(self) -> Vec<Attachment> {
        self.attachments
    }

    pub fn total_known_bytes(&self) -> u64 {
        self.total_known_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_attachment_materializes_immediately() {
        let att = Attachment::from_bytes(vec![1, 2, 3], "a.bin", "application/octet-stream");
        let bytes = att.materialize(Duration::from_secs(1)).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let att = Attachment::from_local_path("/nonexistent/path/file.bin", "f.bin", "application/octet-stream");
        let err = att.materialize(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AttachmentError::NotFound(_)));
    }

    #[test]
    fn exactly_at_cap_is_accepted_one_byte_over_is_too_large() {
        let mut mgr = AttachmentManager::new(1024 * 1024, Duration::from_secs(1));
        let at_cap = Attachment::from_bytes(vec![0u8; 1024 * 1024], "a", "b");
        assert!(mgr.add(at_cap).is_ok());

        let mut mgr2 = AttachmentManager::new(1024 * 1024, Duration::from_secs(1));
        let over = Attachment::from_bytes(vec![0u8; 1024 * 1024 + 1], "a", "b");
        assert!(matches!(mgr2.add(over), Err(AttachmentError::TooLarge)));
    }

    #[test]
    fn aggregate_cap_rejects_second_attachment_but_keeps_first() {
        let mut mgr = AttachmentManager::new(1024 * 1024, Duration::from_secs(1));
        let first = Attachment::from_bytes(vec![0u8; 600 * 1024], "a", "b");
        assert!(mgr.add(first).is_ok());

        let second = Attachment::from_bytes(vec![0u8; 500 * 1024], "c", "d");
        assert!(matches!(mgr.add(second), Err(AttachmentError::TooLarge)));

        assert_eq!(mgr.total_known_bytes(), 600 * 1024);
        assert_eq!(mgr.into_attachments().len(), 1);
    }
}
