//! Server-Sent Events decoding for provider streaming responses.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::core::errors::{Result, TranslationError};

/// One dispatched SSE record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental line-oriented SSE decoder.
///
/// Bytes are fed as they arrive; complete events come out once their
/// terminating blank line has been seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the events it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left open when the stream ends without a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }

        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Converts a raw HTTP byte stream into a stream of SSE events.
pub fn sse_events(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    provider: &'static str,
) -> impl Stream<Item = Result<SseEvent>> + Send {
    async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut decoder = SseDecoder::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(TranslationError::provider(provider, format!("Stream error: {e}")));
                    return;
                }
            };

            for event in decoder.feed(&chunk) {
                yield Ok(event);
            }
        }

        if let Some(event) = decoder.finish() {
            yield Ok(event);
        }
    }
}
