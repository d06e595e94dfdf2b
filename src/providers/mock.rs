//! Scripted in-process provider.
//!
//! Drives the full pipeline in tests without network access:
//! - `Working` streams the configured fragments and counts tokens
//! - the other behaviors fail at a chosen point of the run

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::ProviderType;
use crate::providers::{FragmentStream, GenerationRequest, TranslationProvider};

/// Behavior mode for the scripted provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedBehavior {
    /// Counts tokens and streams every fragment
    Working,
    /// Behaves as if no API key were configured
    MissingCredential,
    /// Token counting fails, generation works
    FailCounting,
    /// Generation is rejected before any fragment
    FailOnStart,
    /// Streams `after` fragments, then errors
    FailAfter { after: usize },
    /// Streams `after` fragments, then never yields again
    StallAfter { after: usize },
}

/// Sets its flag when the fragment stream is dropped
#[derive(Debug)]
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Deterministic provider with call counters
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    provider_type: ProviderType,
    behavior: ScriptedBehavior,
    fragments: Vec<String>,
    count_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
    stream_dropped: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new<S: Into<String>>(
        provider_type: ProviderType,
        fragments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            provider_type,
            behavior: ScriptedBehavior::Working,
            fragments: fragments.into_iter().map(Into::into).collect(),
            count_calls: Arc::new(AtomicUsize::new(0)),
            generate_calls: Arc::new(AtomicUsize::new(0)),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_behavior(mut self, behavior: ScriptedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Tokens reported for `text`: one per four characters, rounded up.
    /// The system prompt is not counted.
    pub fn token_count(text: &str) -> u64 {
        text.chars().count().div_ceil(4) as u64
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Whether the last fragment stream handed out has been dropped
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    fn provider_name(&self) -> String {
        format!("scripted-{}", self.provider_type)
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    async fn count_tokens(
        &self,
        _model_id: &str,
        text: &str,
        _system_prompt: &str,
    ) -> Result<Option<u64>> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            ScriptedBehavior::MissingCredential => Ok(None),
            ScriptedBehavior::FailCounting => Err(TranslationError::provider(
                self.provider_name(),
                "token counting unavailable",
            )),
            _ => Ok(Some(Self::token_count(text))),
        }
    }

    async fn generate_stream(&self, _request: GenerationRequest) -> Result<FragmentStream> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.stream_dropped.store(false, Ordering::SeqCst);

        let (limit, tail) = match self.behavior {
            ScriptedBehavior::MissingCredential => {
                return Err(TranslationError::MissingCredential {
                    provider: self.provider_name(),
                })
            }
            ScriptedBehavior::FailOnStart => {
                return Err(TranslationError::provider(
                    self.provider_name(),
                    "generation rejected",
                ))
            }
            ScriptedBehavior::FailAfter { after } => (after, Some(true)),
            ScriptedBehavior::StallAfter { after } => (after, Some(false)),
            ScriptedBehavior::Working | ScriptedBehavior::FailCounting => {
                (self.fragments.len(), None)
            }
        };

        let fragments: Vec<String> = self.fragments.iter().take(limit).cloned().collect();
        let provider = self.provider_name();
        let guard = DropFlag(self.stream_dropped.clone());

        let stream = async_stream::stream! {
            let _guard = guard;
            for fragment in fragments {
                tokio::task::yield_now().await;
                yield Ok(fragment);
            }
            match tail {
                Some(true) => yield Err(TranslationError::provider(provider, "connection reset mid-stream")),
                Some(false) => futures::future::pending::<()>().await,
                None => {}
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model_id: "m".to_string(),
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
            temperature: 0.1,
            max_output_tokens: 100,
        }
    }

    #[test]
    fn test_token_count() {
        assert_eq!(ScriptedProvider::token_count(""), 0);
        assert_eq!(ScriptedProvider::token_count("abcd"), 1);
        assert_eq!(ScriptedProvider::token_count("abcde"), 2);
    }

    #[tokio::test]
    async fn test_working_streams_all_fragments() {
        let provider = ScriptedProvider::new(ProviderType::Google, vec!["a", "b", "c"]);
        let stream = provider.generate_stream(request()).await.unwrap();
        let out: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(out, vec!["a", "b", "c"]);
        assert_eq!(provider.generate_calls(), 1);
        assert!(provider.stream_dropped());
    }

    #[tokio::test]
    async fn test_fail_after() {
        let provider = ScriptedProvider::new(ProviderType::Anthropic, vec!["a", "b", "c"])
            .with_behavior(ScriptedBehavior::FailAfter { after: 1 });
        let out: Vec<Result<String>> = provider.generate_stream(request()).await.unwrap().collect().await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let provider = ScriptedProvider::new(ProviderType::Anthropic, vec!["a"])
            .with_behavior(ScriptedBehavior::MissingCredential);
        assert_eq!(provider.count_tokens("m", "text", "s").await.unwrap(), None);
        assert!(provider.generate_stream(request()).await.is_err());
    }
}
