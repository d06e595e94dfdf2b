//! Doc Translator - streaming multi-provider document translation
//!
//! This library estimates translation cost across Anthropic and Google models,
//! streams translated text back incrementally, and keeps uploaded documents
//! and their translations on disk. It can be driven from the CLI or through
//! the HTTP API service.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod providers;
pub mod server;
pub mod storage;

// Re-export key types for convenience
pub use core::{
    catalog::ModelCatalog,
    config::TranslatorConfig,
    documents::{DocumentService, UploadRequest},
    errors::{Result, TranslationError},
    estimator::TokenEstimator,
    models::{
        DocumentRecord, ModelEntry, ProviderType, TargetLanguage, TranslationArtifact,
        TranslationSummary,
    },
    orchestrator::{TranslateRequest, TranslationEvent, TranslationOrchestrator, TranslationStream},
};

pub use providers::{ProviderRegistry, TranslationProvider};
pub use storage::DocumentStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Fully wired services sharing one configuration
#[derive(Debug, Clone)]
pub struct Services {
    /// Upload, estimate and download operations
    pub documents: DocumentService,
    /// Translation runs
    pub translator: TranslationOrchestrator,
}

impl Services {
    /// Wire the services with an explicit provider registry
    pub fn with_providers(config: &TranslatorConfig, providers: ProviderRegistry) -> Self {
        let store = DocumentStore::new(&config.storage_dir);
        let catalog = ModelCatalog::new(config.models.clone());
        let documents = DocumentService::new(
            store.clone(),
            catalog.clone(),
            TokenEstimator::new(providers.clone()),
            config.max_upload_bytes,
        );
        let translator = TranslationOrchestrator::new(config, store, catalog, providers);

        Self {
            documents,
            translator,
        }
    }

    /// Wire the services against the real HTTP providers
    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        let providers = ProviderRegistry::from_config(config)?;
        Ok(Self::with_providers(config, providers))
    }
}
