//! Google Gemini (Generative Language API) client

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::ProviderType;
use crate::providers::sse::{sse_events, SseEvent};
use crate::providers::{error_for_status, FragmentStream, GenerationRequest, TranslationProvider};

const PROVIDER: &str = "google";

/// Gemini client for token counting and streaming generation
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn user(text: &'a str) -> Self {
        Self {
            role: Some("user"),
            parts: vec![Part { text }],
        }
    }

    fn system(text: &'a str) -> Self {
        Self {
            role: None,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensRequest<'a> {
    generate_content_request: GenerateContentRequest<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Text and completion flag of one streamed `GenerateContentResponse`
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedChunk {
    pub text: Option<String>,
    /// A candidate carried a `finishReason`
    pub finished: bool,
}

pub(crate) fn parse_stream_chunk(data: &str) -> Result<ParsedChunk> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| TranslationError::provider(PROVIDER, format!("Malformed stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(TranslationError::provider(
            PROVIDER,
            format!("{}: {}", error.status, error.message),
        ));
    }

    let finished = chunk.candidates.iter().any(|c| c.finish_reason.is_some());
    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    Ok(ParsedChunk {
        text: if text.is_empty() { None } else { Some(text) },
        finished,
    })
}

/// Text fragments of a `streamGenerateContent` event stream.
///
/// Some chunk must carry a `finishReason`; a stream that runs out before
/// that was cut off and is reported as an error.
pub(crate) fn text_fragments(
    events: impl Stream<Item = Result<SseEvent>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::stream! {
        let mut events = std::pin::pin!(events);
        let mut finished = false;
        while let Some(event) = events.next().await {
            match event.and_then(|event| parse_stream_chunk(&event.data)) {
                Ok(chunk) => {
                    finished |= chunk.finished;
                    if let Some(text) = chunk.text {
                        yield Ok(text);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if !finished {
            yield Err(TranslationError::provider(PROVIDER, "stream ended before completion"));
        }
    }
}

impl GoogleProvider {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn url(&self, model_id: &str, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.endpoint.trim_end_matches('/'),
            model_id,
            method
        )
    }
}

#[async_trait]
impl TranslationProvider for GoogleProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Google
    }

    async fn count_tokens(
        &self,
        model_id: &str,
        text: &str,
        system_prompt: &str,
    ) -> Result<Option<u64>> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("GOOGLE_GENERATIVE_AI_API_KEY not set, skipping token count");
            return Ok(None);
        };

        let body = CountTokensRequest {
            generate_content_request: GenerateContentRequest {
                model: Some(format!("models/{model_id}")),
                system_instruction: Content::system(system_prompt),
                contents: vec![Content::user(text)],
                generation_config: None,
            },
        };

        let response = self
            .client
            .post(self.url(model_id, "countTokens"))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        let response = error_for_status(ProviderType::Google, response).await?;

        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        Ok(Some(counted.total_tokens))
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TranslationError::MissingCredential {
                provider: PROVIDER.to_string(),
            })?;

        let body = GenerateContentRequest {
            model: None,
            system_instruction: Content::system(&request.system_prompt),
            contents: vec![Content::user(&request.user_prompt)],
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            }),
        };

        let response = self
            .client
            .post(self.url(&request.model_id, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        let response = error_for_status(ProviderType::Google, response).await?;

        let events = sse_events(response.bytes_stream(), PROVIDER);
        let fragments = text_fragments(events);

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_with_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"你好"},{"text":"，世界"}],"role":"model"}}]}"#;
        let chunk = parse_stream_chunk(data).unwrap();
        assert_eq!(chunk.text.as_deref(), Some("你好，世界"));
        assert!(!chunk.finished);
    }

    #[test]
    fn test_parse_chunk_without_text() {
        let data = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":10}}"#;
        let chunk = parse_stream_chunk(data).unwrap();
        assert_eq!(chunk.text, None);
        assert!(chunk.finished);
    }

    fn data_events(payloads: &[&str]) -> impl Stream<Item = Result<SseEvent>> + Send + 'static {
        let events: Vec<Result<SseEvent>> = payloads
            .iter()
            .map(|data| {
                Ok(SseEvent {
                    event: None,
                    data: data.to_string(),
                })
            })
            .collect();
        futures::stream::iter(events)
    }

    #[tokio::test]
    async fn test_fragments_with_finish_reason() {
        let events = data_events(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":" world"}],"role":"model"},"finishReason":"STOP"}]}"#,
        ]);
        let out: Vec<Result<String>> = text_fragments(events).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Hello");
        assert_eq!(out[1].as_ref().unwrap(), " world");
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let events = data_events(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Half a trans"}],"role":"model"}}]}"#,
        ]);
        let out: Vec<Result<String>> = text_fragments(events).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Half a trans");
        let err = out[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("stream ended before completion"));
    }

    #[test]
    fn test_parse_chunk_error() {
        let data = r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = parse_stream_chunk(data).unwrap_err();
        assert!(err.to_string().contains("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn test_count_request_includes_system_instruction() {
        let body = CountTokensRequest {
            generate_content_request: GenerateContentRequest {
                model: Some("models/gemini-2.5-flash".to_string()),
                system_instruction: Content::system("sys"),
                contents: vec![Content::user("text")],
                generation_config: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        let inner = &json["generateContentRequest"];
        assert_eq!(inner["model"], "models/gemini-2.5-flash");
        assert_eq!(inner["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(inner["systemInstruction"].get("role").is_none());
        assert_eq!(inner["contents"][0]["role"], "user");
        assert!(inner.get("generationConfig").is_none());
    }

    #[test]
    fn test_url() {
        let provider = GoogleProvider::new(Client::new(), "https://example.test/", None);
        assert_eq!(
            provider.url("gemini-3-pro", "countTokens"),
            "https://example.test/v1beta/models/gemini-3-pro:countTokens"
        );
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let provider = GoogleProvider::new(Client::new(), "http://127.0.0.1:9", None);
        assert_eq!(
            provider.count_tokens("gemini-2.5-flash", "hi", "sys").await.unwrap(),
            None
        );
    }
}
