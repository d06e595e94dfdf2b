//! Provider implementations for remote translation models.
//!
//! Every vendor exposes the same two capabilities: counting the tokens of a
//! prompt and streaming a generated translation. The orchestrator and the
//! token estimator only see [`TranslationProvider`], so adding a vendor means
//! adding an implementation and registering it in [`ProviderRegistry`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::ProviderType;

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use mock::{ScriptedBehavior, ScriptedProvider};

/// Lazy sequence of translated text fragments.
///
/// Dropping the stream aborts the underlying remote call.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A single generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Provider-specific model identifier
    pub model_id: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Common trait for all LLM providers
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    fn provider_type(&self) -> ProviderType;

    /// Count prompt tokens the way the provider bills them.
    ///
    /// Returns `Ok(None)` when no credential is configured.
    async fn count_tokens(
        &self,
        model_id: &str,
        text: &str,
        system_prompt: &str,
    ) -> Result<Option<u64>>;

    /// Start a streaming generation.
    ///
    /// Fails with [`TranslationError::MissingCredential`] when no credential is configured.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<FragmentStream>;
}

/// Providers keyed by the type declared in the model catalog
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn TranslationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the real HTTP providers from configuration
    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        let client = build_http_client(config)?;

        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicProvider::new(
            client.clone(),
            config.anthropic_endpoint.clone(),
            config.anthropic_api_key.clone(),
        )));
        registry.register(Arc::new(GoogleProvider::new(
            client,
            config.google_endpoint.clone(),
            config.google_api_key.clone(),
        )));

        Ok(registry)
    }

    /// Register a provider, replacing any previous one of the same type
    pub fn register(&mut self, provider: Arc<dyn TranslationProvider>) -> &mut Self {
        self.providers.insert(provider.provider_type(), provider);
        self
    }

    pub fn with(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, provider_type: ProviderType) -> Result<Arc<dyn TranslationProvider>> {
        self.providers
            .get(&provider_type)
            .cloned()
            .ok_or_else(|| TranslationError::Config {
                message: format!("No provider registered for {provider_type}"),
            })
    }
}

/// Shared reqwest client for all providers.
///
/// Only the connect phase is bounded: a translation stream may legitimately
/// run for minutes.
fn build_http_client(config: &TranslatorConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .pool_max_idle_per_host(10);

    if let Some(proxy_url) = &config.proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| TranslationError::Config {
            message: format!("Invalid proxy url {proxy_url}: {e}"),
        })?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Turn a non-success HTTP response into a provider error
pub(crate) async fn error_for_status(
    provider: ProviderType,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TranslationError::provider(
        provider.to_string(),
        format!("HTTP {}: {}", status.as_u16(), body),
    ))
}
