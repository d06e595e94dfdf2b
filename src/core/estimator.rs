//! Provider-backed token estimation

use tracing::debug;

use crate::core::models::ModelEntry;
use crate::core::prompt::TRANSLATION_SYSTEM_PROMPT;
use crate::providers::ProviderRegistry;

/// Converts text into a token count using the model's own provider.
///
/// Never fails: a missing credential, a missing provider or a remote error
/// all come back as `0`, which means "unknown" rather than "free".
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    providers: ProviderRegistry,
}

impl TokenEstimator {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    pub async fn estimate(&self, model: &ModelEntry, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        let provider = match self.providers.get(model.provider_type) {
            Ok(provider) => provider,
            Err(e) => {
                debug!(model_id = %model.id, error = %e, "token estimation skipped");
                return 0;
            }
        };

        match provider
            .count_tokens(&model.provider_model_id, text, TRANSLATION_SYSTEM_PROMPT)
            .await
        {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!(model_id = %model.id, provider = %model.provider_type, "no credential, token estimate unavailable");
                0
            }
            Err(e) => {
                debug!(model_id = %model.id, error = %e, "token estimation failed");
                0
            }
        }
    }
}
