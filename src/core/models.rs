//! Core data models for translation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::errors::TranslationError;

/// Characters per page used for page estimates
pub const CHARS_PER_PAGE: usize = 2000;

/// Remote vendor behind a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    Google,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::Google => write!(f, "google"),
        }
    }
}

/// Languages a document can be translated into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    #[default]
    En,
    Zh,
}

impl TargetLanguage {
    /// Short code used in file names and payloads
    pub fn code(&self) -> &'static str {
        match self {
            TargetLanguage::En => "en",
            TargetLanguage::Zh => "zh",
        }
    }

    /// Human readable label embedded in the prompt
    pub fn label(&self) -> &'static str {
        match self {
            TargetLanguage::En => "English",
            TargetLanguage::Zh => "Simplified Chinese",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TargetLanguage {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(TargetLanguage::En),
            "zh" | "zh-cn" => Ok(TargetLanguage::Zh),
            other => Err(TranslationError::invalid_input(format!(
                "Unsupported target language: {other}"
            ))),
        }
    }
}

/// Translation model information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    pub label: String,
    pub provider: String,
    pub provider_type: ProviderType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<String>,
    pub price_per_million_input: f64,
    pub price_per_million_output: f64,
    /// Identifier passed to the remote API
    pub provider_model_id: String,
}

/// Stored metadata for one uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_id: Uuid,
    #[schema(value_type = String)]
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub extension: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub target_language: TargetLanguage,
    pub model_id: String,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationArtifact>,
}

/// Persisted output of one translation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslationArtifact {
    pub document_id: Uuid,
    #[schema(value_type = String)]
    pub path: PathBuf,
    pub mime_type: String,
    pub name: String,
}

/// Final usage record of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslationSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Rounded to 6 decimal places
    pub cost: f64,
    pub duration_ms: u64,
    pub page_count: u32,
    pub model_label: String,
    pub target_language: TargetLanguage,
}

/// Page estimate for a text: `ceil(chars / 2000)`, at least 1
pub fn page_count(text: &str) -> u32 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_PAGE).max(1) as u32
}
