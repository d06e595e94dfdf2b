//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::models::{ModelEntry, ProviderType};

/// Configuration for translator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub google_api_key: Option<String>,
    pub anthropic_endpoint: String,
    pub google_endpoint: String,
    pub storage_dir: PathBuf,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub connect_timeout_ms: u64,
    pub proxy_url: Option<String>,
    pub max_upload_bytes: usize,
    /// Fragments buffered between the provider and the consumer
    pub stream_buffer: usize,
    pub fail_on_empty_translation: bool,
    pub models: Vec<ModelEntry>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            google_api_key: None,
            anthropic_endpoint: "https://api.anthropic.com".to_string(),
            google_endpoint: "https://generativelanguage.googleapis.com".to_string(),
            storage_dir: PathBuf::from("uploads"),
            temperature: 0.1,
            max_output_tokens: 16000,
            connect_timeout_ms: 10000,
            proxy_url: None,
            max_upload_bytes: 10 * 1024 * 1024,
            stream_buffer: 64,
            fail_on_empty_translation: false,
            models: vec![],
        }
    }
}

/// Default model catalog: (id, label, provider type, input $/M, output $/M, context window, description)
const DEFAULT_MODELS: &[(&str, &str, ProviderType, f64, f64, &str, &str)] = &[
    (
        "claude-haiku-4-5",
        "Claude Haiku 4.5",
        ProviderType::Anthropic,
        1.0,
        5.0,
        "Up to 200K tokens (Haiku tier)",
        "Low-latency translator tuned for real-time workflows; retains safety guardrails while staying economical.",
    ),
    (
        "claude-sonnet-4-5",
        "Claude Sonnet 4.5",
        ProviderType::Anthropic,
        3.0,
        15.0,
        "Up to 200K tokens in default tier (1M for API beta)",
        "High-capacity model with a 1M-token context window when run via the API; best for large, nuanced docs.",
    ),
    (
        "claude-opus-4-5",
        "Claude Opus 4.5",
        ProviderType::Anthropic,
        5.0,
        25.0,
        "Up to 1M tokens",
        "Top-tier reasoning model; designed for agent orchestration where fidelity and context matter most.",
    ),
    (
        "gemini-2.5-flash",
        "Gemini 2.5 Flash",
        ProviderType::Google,
        0.3,
        2.5,
        "1M tokens",
        "Hybrid reasoning model with a 1M-token context window, affordable for document translation and analysis.",
    ),
    (
        "gemini-3-flash",
        "Gemini 3 Flash Preview",
        ProviderType::Google,
        0.5,
        3.0,
        "Preview (1M+ tokens)",
        "Frontier-level reasoning tuned for speed, with token costs optimized for high-frequency translation streams.",
    ),
    (
        "gemini-3-pro",
        "Gemini 3 Pro Preview",
        ProviderType::Google,
        2.0,
        12.0,
        "Preview (1M+ tokens)",
        "High-performance reasoning that trades higher cost for the most accurate, pro-level responses.",
    ),
];

/// Built-in model catalog entries
pub fn default_models() -> Vec<ModelEntry> {
    DEFAULT_MODELS
        .iter()
        .map(
            |(id, label, provider_type, input, output, context, description)| ModelEntry {
                id: id.to_string(),
                label: label.to_string(),
                provider: match provider_type {
                    ProviderType::Anthropic => "Anthropic",
                    ProviderType::Google => "Google",
                }
                .to_string(),
                provider_type: *provider_type,
                description: description.to_string(),
                context_window: Some(context.to_string()),
                price_per_million_input: *input,
                price_per_million_output: *output,
                provider_model_id: id.to_string(),
            },
        )
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            anthropic_api_key: env_string("ANTHROPIC_API_KEY"),
            google_api_key: env_string("GOOGLE_GENERATIVE_AI_API_KEY"),
            anthropic_endpoint: env_string("ANTHROPIC_API_URL").unwrap_or(defaults.anthropic_endpoint),
            google_endpoint: env_string("GOOGLE_API_URL").unwrap_or(defaults.google_endpoint),
            storage_dir: env_string("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            temperature: env_parse("TRANSLATION_TEMPERATURE", defaults.temperature)?,
            max_output_tokens: env_parse("MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            connect_timeout_ms: env_parse("CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
            proxy_url: env_string("HTTP_PROXY_URL"),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            stream_buffer: env_parse("STREAM_BUFFER", defaults.stream_buffer)?,
            fail_on_empty_translation: env_parse(
                "FAIL_ON_EMPTY_TRANSLATION",
                defaults.fail_on_empty_translation,
            )?,
            models: vec![],
        })
    }

    /// Load configuration with default models
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::from_env()?;
        config.fill_default_models();
        Ok(config)
    }

    /// Load from JSON file; credentials still come from the environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.anthropic_api_key = env_string("ANTHROPIC_API_KEY");
        config.google_api_key = env_string("GOOGLE_GENERATIVE_AI_API_KEY");
        config.fill_default_models();
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn fill_default_models(&mut self) {
        if self.models.is_empty() {
            self.models = default_models();
            info!("Loaded {} default models", self.models.len());
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow::anyhow!("temperature must be between 0 and 2"));
        }

        if self.max_output_tokens == 0 {
            return Err(anyhow::anyhow!("max_output_tokens must be greater than 0"));
        }

        if self.stream_buffer == 0 {
            return Err(anyhow::anyhow!("stream_buffer must be greater than 0"));
        }

        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("max_upload_bytes must be greater than 0"));
        }

        if self.models.is_empty() {
            return Err(anyhow::anyhow!("No models configured"));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(anyhow::anyhow!("Duplicate model id: {}", model.id));
            }
            if model.price_per_million_input < 0.0 || model.price_per_million_output < 0.0 {
                return Err(anyhow::anyhow!("Model {} has a negative price", model.id));
            }
        }

        Ok(())
    }

    /// API key for a provider, if configured
    pub fn api_key(&self, provider: ProviderType) -> Option<&str> {
        match provider {
            ProviderType::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderType::Google => self.google_api_key.as_deref(),
        }
    }
}
