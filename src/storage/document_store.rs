//! File-system document store.
//!
//! Layout under the storage root:
//! - `{id}{ext}`: uploaded source bytes
//! - `{id}.json`: metadata sidecar ([`DocumentRecord`])
//! - `{id}.translation.txt`: latest translation artifact

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{DocumentRecord, TranslationArtifact};

/// Result of writing an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
    pub mime_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Owns the on-disk representation of documents and artifacts
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

/// Extension of `filename` including the dot, or `.txt`
pub fn sanitize_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| ".txt".to_string())
}

/// Parse a caller supplied document id
pub fn parse_document_id(raw: &str) -> Result<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TranslationError::invalid_input("Missing document id."));
    }
    Uuid::parse_str(raw).map_err(|_| TranslationError::invalid_input("Invalid document id."))
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self, document_id: Uuid) -> PathBuf {
        self.root.join(format!("{document_id}.json"))
    }

    pub fn artifact_path(&self, document_id: Uuid) -> PathBuf {
        self.root.join(format!("{document_id}.translation.txt"))
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TranslationError::storage(&self.root, e))
    }

    /// Write bytes to a sibling temp file, then rename over `path`
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(TranslationError::storage(path, e));
        }

        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            TranslationError::storage(path, format!("rename from {} failed: {e}", tmp.display()))
        })
    }

    /// Persist uploaded bytes under a fresh identifier
    pub async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: Option<&str>,
    ) -> Result<StoredDocument> {
        self.ensure_root().await?;

        let id = Uuid::new_v4();
        let extension = sanitize_extension(original_name);
        let path = self.root.join(format!("{id}{extension}"));

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| TranslationError::storage(&path, e))?;

        debug!(document_id = %id, path = %path.display(), size = bytes.len(), "stored source document");

        Ok(StoredDocument {
            id,
            name: original_name.to_string(),
            path,
            size: bytes.len() as u64,
            extension,
            mime_type: mime_type.map(str::to_string),
            uploaded_at: Utc::now(),
        })
    }

    /// Write or overwrite the metadata sidecar for `record.document_id`
    pub async fn persist_metadata(&self, record: &DocumentRecord) -> Result<()> {
        self.ensure_root().await?;

        let path = self.metadata_path(record.document_id);
        let json = serde_json::to_vec_pretty(record)?;
        self.write_atomic(&path, &json).await
    }

    /// Read the metadata sidecar; `None` when it does not exist
    pub async fn read_metadata(&self, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        let path = self.metadata_path(document_id);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TranslationError::storage(&path, e)),
        };

        let record = serde_json::from_slice(&raw)
            .map_err(|e| TranslationError::storage(&path, format!("corrupt metadata: {e}")))?;
        Ok(Some(record))
    }

    /// Read the source bytes referenced by a record
    pub async fn read_source(&self, record: &DocumentRecord) -> Result<Vec<u8>> {
        tokio::fs::read(&record.source_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranslationError::not_found("Document metadata missing.")
            } else {
                TranslationError::storage(&record.source_path, e)
            }
        })
    }

    /// Write the translated bytes and point the metadata sidecar at them.
    ///
    /// A second call for the same document replaces the first artifact.
    pub async fn persist_artifact(
        &self,
        document_id: Uuid,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> Result<TranslationArtifact> {
        let mut record = self.read_metadata(document_id).await?.ok_or_else(|| {
            TranslationError::not_found(format!("Document {document_id} has no metadata"))
        })?;

        let path = self.artifact_path(document_id);
        self.write_atomic(&path, bytes).await?;

        let artifact = TranslationArtifact {
            document_id,
            path,
            mime_type: mime_type.to_string(),
            name: name.to_string(),
        };
        record.translation = Some(artifact.clone());
        self.persist_metadata(&record).await?;

        debug!(document_id = %document_id, name = %name, size = bytes.len(), "stored translation artifact");
        Ok(artifact)
    }

    /// Bytes of the latest artifact; `NotFound` when there is none
    pub async fn read_artifact(&self, document_id: Uuid) -> Result<(TranslationArtifact, Vec<u8>)> {
        let artifact = self
            .read_metadata(document_id)
            .await?
            .and_then(|record| record.translation)
            .ok_or_else(|| TranslationError::not_found("Translated document not found."))?;

        let bytes = tokio::fs::read(&artifact.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranslationError::not_found("Translated document not found.")
            } else {
                TranslationError::storage(&artifact.path, e)
            }
        })?;

        Ok((artifact, bytes))
    }
}
