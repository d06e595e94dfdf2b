//! Streaming translation runs.
//!
//! A run moves through `Received -> Loaded -> Streaming -> Completed`, or ends
//! in `Failed` as soon as a precondition or the remote call fails. Validation
//! and loading happen inside [`TranslationOrchestrator::start`], so callers get
//! a plain error for bad input, unknown documents and rejected provider calls.
//! Streaming then runs on a spawned task that forwards each fragment through a
//! bounded channel while keeping its own copy of the text. Dropping the
//! returned [`TranslationStream`] cancels the run: the provider stream is
//! dropped and nothing is persisted.

use futures::{Stream, StreamExt};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::core::catalog::ModelCatalog;
use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::estimator::TokenEstimator;
use crate::core::models::{page_count, ModelEntry, TargetLanguage, TranslationSummary};
use crate::core::prompt::{build_user_prompt, TRANSLATION_SYSTEM_PROMPT};
use crate::core::summary::{RunUsage, SummaryReporter};
use crate::providers::{FragmentStream, GenerationRequest, ProviderRegistry};
use crate::storage::{parse_document_id, DocumentStore};

/// Mime type of every translation artifact
pub const ARTIFACT_MIME_TYPE: &str = "text/plain";

/// Translate request as received at the boundary
#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub document_id: String,
    pub model_id: String,
    /// Falls back to the language chosen at upload
    pub target_language: Option<TargetLanguage>,
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationState {
    Received,
    Loaded,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for TranslationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TranslationState::Received => "received",
            TranslationState::Loaded => "loaded",
            TranslationState::Streaming => "streaming",
            TranslationState::Completed => "completed",
            TranslationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Item delivered to the consumer of a run
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationEvent {
    Fragment(String),
    /// Always the last event of a successful run
    Summary(TranslationSummary),
}

/// Full text and summary of a run consumed to the end
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTranslation {
    pub text: String,
    pub summary: TranslationSummary,
}

/// Consumer side of a running translation
pub struct TranslationStream {
    document_id: Uuid,
    events: mpsc::Receiver<Result<TranslationEvent>>,
    state: watch::Receiver<TranslationState>,
    task: JoinHandle<()>,
}

impl TranslationStream {
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn state(&self) -> TranslationState {
        *self.state.borrow()
    }

    pub async fn next_event(&mut self) -> Option<Result<TranslationEvent>> {
        self.events.recv().await
    }

    /// Abort the run and wait until the producer side has stopped
    pub async fn cancel(self) -> TranslationState {
        let TranslationStream {
            events, state, task, ..
        } = self;
        drop(events);

        if let Err(e) = task.await {
            error!(error = %e, "translation task ended abnormally");
        }
        let final_state = *state.borrow();
        final_state
    }

    /// Consume every event, returning the full text and the summary
    pub async fn collect_translation(mut self) -> Result<CompletedTranslation> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event? {
                TranslationEvent::Fragment(fragment) => text.push_str(&fragment),
                TranslationEvent::Summary(summary) => return Ok(CompletedTranslation { text, summary }),
            }
        }
        Err(TranslationError::Cancelled)
    }
}

impl Stream for TranslationStream {
    type Item = Result<TranslationEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl fmt::Debug for TranslationStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationStream")
            .field("document_id", &self.document_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Display name of the artifact: source stem plus language suffix
pub fn artifact_name(source_name: Option<&str>, document_id: Uuid, language: TargetLanguage) -> String {
    let stem = source_name
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("translation-{document_id}"));
    format!("{stem}-{}.txt", language.code())
}

/// Per-run tunables taken from configuration
#[derive(Debug, Clone, Copy)]
struct RunSettings {
    temperature: f32,
    max_output_tokens: u32,
    stream_buffer: usize,
    fail_on_empty_translation: bool,
}

impl From<&TranslatorConfig> for RunSettings {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            stream_buffer: config.stream_buffer.max(1),
            fail_on_empty_translation: config.fail_on_empty_translation,
        }
    }
}

/// Starts translation runs against the configured providers
#[derive(Debug, Clone)]
pub struct TranslationOrchestrator {
    store: DocumentStore,
    catalog: ModelCatalog,
    providers: ProviderRegistry,
    estimator: TokenEstimator,
    reporter: SummaryReporter,
    settings: RunSettings,
}

impl TranslationOrchestrator {
    pub fn new(
        config: &TranslatorConfig,
        store: DocumentStore,
        catalog: ModelCatalog,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            catalog,
            estimator: TokenEstimator::new(providers.clone()),
            providers,
            reporter: SummaryReporter::new(),
            settings: RunSettings::from(config),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Validate, load and open the provider stream, then stream in the background
    pub async fn start(&self, request: TranslateRequest) -> Result<TranslationStream> {
        let (state_tx, state_rx) = watch::channel(TranslationState::Received);

        match self.prepare(&request, &state_tx).await {
            Ok((run, fragments)) => {
                state_tx.send_replace(TranslationState::Streaming);
                debug!(document_id = %run.document_id, state = %TranslationState::Streaming, "translation streaming");

                let (tx, rx) = mpsc::channel(self.settings.stream_buffer);
                let document_id = run.document_id;
                let span = info_span!("translation", document_id = %document_id, model_id = %run.model.id);
                let task = tokio::spawn(run.execute(fragments, tx, state_tx).instrument(span));

                Ok(TranslationStream {
                    document_id,
                    events: rx,
                    state: state_rx,
                    task,
                })
            }
            Err(e) => {
                let stage = *state_tx.borrow();
                if e.is_user_facing() {
                    debug!(document_id = %request.document_id, model_id = %request.model_id, stage = %stage, error = %e, "translation request rejected");
                } else {
                    error!(document_id = %request.document_id, model_id = %request.model_id, stage = %stage, error = %e, "translation failed");
                }
                state_tx.send_replace(TranslationState::Failed);
                Err(e)
            }
        }
    }

    async fn prepare(
        &self,
        request: &TranslateRequest,
        state: &watch::Sender<TranslationState>,
    ) -> Result<(TranslationRun, FragmentStream)> {
        if request.document_id.trim().is_empty() || request.model_id.trim().is_empty() {
            return Err(TranslationError::invalid_input("Missing document or model selection."));
        }
        let model = self.catalog.require(&request.model_id)?.clone();
        let document_id = parse_document_id(&request.document_id)?;

        let record = self
            .store
            .read_metadata(document_id)
            .await?
            .ok_or_else(|| TranslationError::not_found("Document metadata missing."))?;
        let bytes = self.store.read_source(&record).await?;
        let source_text = String::from_utf8_lossy(&bytes).into_owned();
        let pages = record.page_count.unwrap_or_else(|| page_count(&source_text));
        let target_language = request.target_language.unwrap_or(record.target_language);
        state.send_replace(TranslationState::Loaded);
        debug!(document_id = %document_id, state = %TranslationState::Loaded, bytes = source_text.len(), "source document loaded");

        let provider = self.providers.get(model.provider_type)?;
        let fragments = provider
            .generate_stream(GenerationRequest {
                model_id: model.provider_model_id.clone(),
                system_prompt: TRANSLATION_SYSTEM_PROMPT.to_string(),
                user_prompt: build_user_prompt(target_language, &source_text),
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
            })
            .await?;

        let run = TranslationRun {
            document_id,
            model,
            source_name: record.name,
            source_text,
            pages,
            target_language,
            started: Instant::now(),
            store: self.store.clone(),
            estimator: self.estimator.clone(),
            reporter: self.reporter,
            fail_on_empty_translation: self.settings.fail_on_empty_translation,
        };
        Ok((run, fragments))
    }
}

/// Everything the streaming task owns
struct TranslationRun {
    document_id: Uuid,
    model: ModelEntry,
    source_name: Option<String>,
    source_text: String,
    pages: u32,
    target_language: TargetLanguage,
    started: Instant,
    store: DocumentStore,
    estimator: TokenEstimator,
    reporter: SummaryReporter,
    fail_on_empty_translation: bool,
}

impl TranslationRun {
    async fn execute(
        self,
        mut fragments: FragmentStream,
        tx: mpsc::Sender<Result<TranslationEvent>>,
        state: watch::Sender<TranslationState>,
    ) {
        let mut translation = String::new();

        loop {
            tokio::select! {
                biased;
                _ = tx.closed() => {
                    drop(fragments);
                    return self.cancelled(&state, &translation);
                }
                next = fragments.next() => match next {
                    Some(Ok(fragment)) => {
                        if fragment.is_empty() {
                            continue;
                        }
                        translation.push_str(&fragment);
                        if tx.send(Ok(TranslationEvent::Fragment(fragment))).await.is_err() {
                            drop(fragments);
                            return self.cancelled(&state, &translation);
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, received_chars = translation.len(), "translation stream failed");
                        state.send_replace(TranslationState::Failed);
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    None => break,
                }
            }
        }
        drop(fragments);

        if tx.is_closed() {
            return self.cancelled(&state, &translation);
        }

        if translation.is_empty() && self.fail_on_empty_translation {
            warn!("model returned an empty translation");
            state.send_replace(TranslationState::Failed);
            let _ = tx.send(Err(TranslationError::EmptyTranslation)).await;
            return;
        }

        let (input_tokens, output_tokens) = tokio::join!(
            self.estimator.estimate(&self.model, &self.source_text),
            self.estimator.estimate(&self.model, &translation),
        );

        if tx.is_closed() {
            return self.cancelled(&state, &translation);
        }
        self.persist_best_effort(&translation).await;

        let summary = self.reporter.report(&RunUsage {
            document_id: self.document_id,
            model: &self.model,
            target_language: self.target_language,
            input_tokens,
            output_tokens,
            page_count: self.pages,
            elapsed: self.started.elapsed(),
        });

        state.send_replace(TranslationState::Completed);
        if tx.send(Ok(TranslationEvent::Summary(summary))).await.is_err() {
            debug!("consumer left before the summary was delivered");
        }
    }

    fn cancelled(&self, state: &watch::Sender<TranslationState>, translation: &str) {
        info!(discarded_chars = translation.len(), "translation cancelled by consumer");
        state.send_replace(TranslationState::Failed);
    }

    /// The consumer already has the text, so a failed write is only logged
    async fn persist_best_effort(&self, translation: &str) {
        let name = artifact_name(self.source_name.as_deref(), self.document_id, self.target_language);

        if let Err(e) = self
            .store
            .persist_artifact(self.document_id, translation.as_bytes(), &name, ARTIFACT_MIME_TYPE)
            .await
        {
            error!(error = %e, "failed to persist translated document");
        }
    }
}
