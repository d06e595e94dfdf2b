//! Anthropic Messages API client

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::ProviderType;
use crate::providers::sse::{sse_events, SseEvent};
use crate::providers::{error_for_status, FragmentStream, GenerationRequest, TranslationProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";

/// Anthropic client for token counting and streaming generation
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

/// Streaming event payloads; only the ones that matter are modelled
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// What a single streamed event means for the fragment sequence
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamStep {
    Text(String),
    Stop,
    Skip,
}

/// Interpret one `data:` payload of the Messages stream
pub(crate) fn parse_stream_event(data: &str) -> Result<StreamStep> {
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| TranslationError::provider(PROVIDER, format!("Malformed stream event: {e}")))?;

    Ok(match event {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => StreamStep::Text(text),
        StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => StreamStep::Skip,
        StreamEvent::MessageStop => StreamStep::Stop,
        StreamEvent::Error { error } => {
            return Err(TranslationError::provider(
                PROVIDER,
                format!("{}: {}", error.kind, error.message),
            ))
        }
    })
}

/// Text fragments of a Messages event stream.
///
/// The stream must end with `message_stop`; running out of events before it
/// means the response was cut off and is reported as an error.
pub(crate) fn text_fragments(
    events: impl Stream<Item = Result<SseEvent>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::stream! {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            match event.and_then(|event| parse_stream_event(&event.data)) {
                Ok(StreamStep::Text(text)) => yield Ok(text),
                Ok(StreamStep::Skip) => continue,
                Ok(StreamStep::Stop) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        yield Err(TranslationError::provider(PROVIDER, "stream ended before completion"));
    }
}

impl AnthropicProvider {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str, api_key: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }
}

#[async_trait]
impl TranslationProvider for AnthropicProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    async fn count_tokens(
        &self,
        model_id: &str,
        text: &str,
        system_prompt: &str,
    ) -> Result<Option<u64>> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("ANTHROPIC_API_KEY not set, skipping token count");
            return Ok(None);
        };

        let body = CountTokensRequest {
            model: model_id,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: text,
            }],
        };

        let response = self
            .post("/v1/messages/count_tokens", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        let response = error_for_status(ProviderType::Anthropic, response).await?;

        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        Ok(Some(counted.input_tokens))
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TranslationError::MissingCredential {
                provider: PROVIDER.to_string(),
            })?;

        let body = MessagesRequest {
            model: &request.model_id,
            system: &request.system_prompt,
            messages: vec![Message {
                role: "user",
                content: &request.user_prompt,
            }],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            stream: true,
        };

        let response = self
            .post("/v1/messages", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::provider(PROVIDER, e))?;
        let response = error_for_status(ProviderType::Anthropic, response).await?;

        let events = sse_events(response.bytes_stream(), PROVIDER);
        let fragments = text_fragments(events);

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Bonjour"}}"#;
        assert_eq!(
            parse_stream_event(data).unwrap(),
            StreamStep::Text("Bonjour".to_string())
        );
    }

    #[test]
    fn test_parse_non_text_events_are_skipped() {
        for data in [
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":15}}"#,
        ] {
            assert_eq!(parse_stream_event(data).unwrap(), StreamStep::Skip, "{data}");
        }
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
    async fn test_fragments_end_at_message_stop() {
        let events = data_events(&[
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Bon"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"jour"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        let out: Vec<Result<String>> = text_fragments(events).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Bon");
        assert_eq!(out[1].as_ref().unwrap(), "jour");
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let events = data_events(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Half a trans"}}"#,
        ]);
        let out: Vec<Result<String>> = text_fragments(events).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Half a trans");
        let err = out[1].as_ref().unwrap_err();
        assert!(matches!(err, TranslationError::Provider { .. }));
        assert!(err.to_string().contains("stream ended before completion"));
    }

    #[test]
    fn test_parse_message_stop() {
        assert_eq!(
            parse_stream_event(r#"{"type":"message_stop"}"#).unwrap(),
            StreamStep::Stop
        );
    }

    #[test]
    fn test_parse_error_event() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = parse_stream_event(data).unwrap_err();
        assert!(err.to_string().contains("overloaded_error: Overloaded"));
    }

    #[test]
    fn test_parse_malformed_event() {
        assert!(parse_stream_event("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let provider = AnthropicProvider::new(Client::new(), "http://127.0.0.1:9", None);

        let counted = provider
            .count_tokens("claude-haiku-4-5", "hello", "system")
            .await
            .unwrap();
        assert_eq!(counted, None);

        let request = GenerationRequest {
            model_id: "claude-haiku-4-5".to_string(),
            system_prompt: "system".to_string(),
            user_prompt: "hello".to_string(),
            temperature: 0.1,
            max_output_tokens: 16,
        };
        let err = provider.generate_stream(request).await.err().unwrap();
        assert!(matches!(err, TranslationError::MissingCredential { .. }));
    }

    #[test]
    fn test_count_request_shape() {
        let body = CountTokensRequest {
            model: "claude-haiku-4-5",
            system: "sys",
            messages: vec![Message {
                role: "user",
                content: "text",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "text");
    }
}
