//! Upload, estimate and download operations over the document store

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::catalog::ModelCatalog;
use crate::core::cost::CostBreakdown;
use crate::core::errors::{Result, TranslationError};
use crate::core::estimator::TokenEstimator;
use crate::core::models::{page_count, DocumentRecord, ModelEntry, TargetLanguage};
use crate::storage::{parse_document_id, DocumentStore};

/// Model used when an upload does not name one
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

/// An uploaded file as received at the boundary
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub target_language: Option<TargetLanguage>,
    pub model_id: Option<String>,
}

/// Public view of a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub label: String,
    pub provider: String,
    pub description: String,
    pub price_per_million_input: f64,
    pub price_per_million_output: f64,
}

impl From<&ModelEntry> for ModelSummary {
    fn from(model: &ModelEntry) -> Self {
        Self {
            id: model.id.clone(),
            label: model.label.clone(),
            provider: model.provider.clone(),
            description: model.description.clone(),
            price_per_million_input: model.price_per_million_input,
            price_per_million_output: model.price_per_million_output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub document_id: Uuid,
    pub name: String,
    pub size: u64,
    pub page_count: u32,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    pub target_language: TargetLanguage,
    pub model_id: String,
    pub model: ModelSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EstimateOutcome {
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    pub model: ModelSummary,
}

/// Translated bytes ready to be sent to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedArtifact {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DownloadedArtifact {
    /// `Content-Disposition` header value
    pub fn content_disposition(&self) -> String {
        let name = self.name.replace(['"', '\r', '\n'], "_");
        format!("attachment; filename=\"{name}\"")
    }
}

fn is_text_upload(file_name: &str, mime_type: Option<&str>) -> bool {
    let mime_is_text = mime_type
        .map(|m| m.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case("text/plain"))
        .unwrap_or(false);
    mime_is_text || file_name.to_ascii_lowercase().ends_with(".txt")
}

fn decode_text(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|_| TranslationError::invalid_input("The uploaded file is not valid UTF-8 text."))
}

/// Document lifecycle operations that surround a translation run
#[derive(Debug, Clone)]
pub struct DocumentService {
    store: DocumentStore,
    catalog: ModelCatalog,
    estimator: TokenEstimator,
    max_upload_bytes: usize,
}

impl DocumentService {
    pub fn new(
        store: DocumentStore,
        catalog: ModelCatalog,
        estimator: TokenEstimator,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            estimator,
            max_upload_bytes,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Validate, estimate and persist an uploaded text file
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        if !is_text_upload(&request.file_name, request.mime_type.as_deref()) {
            return Err(TranslationError::invalid_input("Only TXT uploads are supported."));
        }
        if request.bytes.len() > self.max_upload_bytes {
            return Err(TranslationError::invalid_input(format!(
                "File too large: {} bytes exceeds the limit of {} bytes.",
                request.bytes.len(),
                self.max_upload_bytes
            )));
        }

        let text = decode_text(&request.bytes)?;
        if text.trim().is_empty() {
            return Err(TranslationError::invalid_input("The uploaded file is empty."));
        }

        let target_language = request.target_language.unwrap_or_default();
        let model_id = request
            .model_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let model = self.catalog.require(&model_id)?;

        let pages = page_count(text);
        let estimated_tokens = self.estimator.estimate(model, text).await;
        let estimated_cost = CostBreakdown::estimate(model, estimated_tokens).total();

        let mime_type = request.mime_type.clone().or_else(|| Some("text/plain".to_string()));
        let stored = self
            .store
            .store(&request.bytes, &request.file_name, mime_type.as_deref())
            .await?;

        let record = DocumentRecord {
            document_id: stored.id,
            source_path: stored.path.clone(),
            name: Some(stored.name.clone()),
            mime_type: stored.mime_type.clone(),
            extension: stored.extension.clone(),
            size: stored.size,
            uploaded_at: stored.uploaded_at,
            target_language,
            model_id: model.id.clone(),
            estimated_tokens,
            estimated_cost,
            page_count: Some(pages),
            translation: None,
        };
        self.store.persist_metadata(&record).await?;

        info!(
            document_id = %stored.id,
            model_id = %model.id,
            target_language = %target_language,
            pages,
            estimated_tokens,
            estimated_cost,
            "document uploaded for translation"
        );

        Ok(UploadOutcome {
            document_id: stored.id,
            name: stored.name,
            size: stored.size,
            page_count: pages,
            estimated_tokens,
            estimated_cost: CostBreakdown::estimate(model, estimated_tokens).reported_total(),
            target_language,
            model_id: model.id.clone(),
            model: ModelSummary::from(model),
        })
    }

    /// Re-estimate stored source text against a (possibly different) model
    pub async fn estimate(&self, document_id: &str, model_id: &str) -> Result<EstimateOutcome> {
        if document_id.trim().is_empty() || model_id.trim().is_empty() {
            return Err(TranslationError::invalid_input("Missing document or model selection."));
        }
        let model = self.catalog.require(model_id)?;
        let document_id = parse_document_id(document_id)?;

        let record = self
            .store
            .read_metadata(document_id)
            .await?
            .ok_or_else(|| TranslationError::not_found("Document metadata missing."))?;
        let bytes = self.store.read_source(&record).await?;
        let text = String::from_utf8_lossy(&bytes);

        let estimated_tokens = self.estimator.estimate(model, &text).await;
        let estimated_cost = CostBreakdown::estimate(model, estimated_tokens).reported_total();

        info!(
            document_id = %document_id,
            model_id = %model.id,
            estimated_tokens,
            estimated_cost,
            "re-estimated tokens for uploaded document"
        );

        Ok(EstimateOutcome {
            estimated_tokens,
            estimated_cost,
            model: ModelSummary::from(model),
        })
    }

    /// Latest translation artifact of a document
    pub async fn download(&self, document_id: &str) -> Result<DownloadedArtifact> {
        let document_id = parse_document_id(document_id)?;
        let (artifact, bytes) = self.store.read_artifact(document_id).await?;

        Ok(DownloadedArtifact {
            name: artifact.name,
            mime_type: artifact.mime_type,
            bytes,
        })
    }
}
