//! HTTP API server implementation

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::core::config::TranslatorConfig;
use crate::core::documents::{EstimateOutcome, ModelSummary, UploadOutcome, UploadRequest};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{ModelEntry, ProviderType, TargetLanguage, TranslationSummary};
use crate::core::orchestrator::{TranslateRequest, TranslationEvent};
use crate::Services;

const UPLOAD_FAILED: &str = "Unable to process the TXT file. Please try again with valid text content.";
const ESTIMATE_FAILED: &str = "Unable to re-estimate tokens for this document.";
const TRANSLATE_FAILED: &str = "Unable to translate document.";
const DOWNLOAD_FAILED: &str = "Unable to load the translated document.";

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state
#[derive(Clone)]
pub struct AppState {
    services: Services,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(services: Services, config: &TranslatorConfig) -> Self {
        Self {
            services,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Health check response
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// Models list response
#[derive(Serialize, ToSchema)]
struct ModelsResponse {
    object: String,
    data: Vec<ModelEntry>,
}

/// Multipart body of an upload
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    target_language: Option<TargetLanguage>,
    model_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct EstimateBody {
    document_id: Option<String>,
    model_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct TranslateBody {
    document_id: Option<String>,
    model_id: Option<String>,
    target_language: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
struct DownloadQuery {
    document_id: Option<String>,
}

/// Error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// A [`TranslationError`] paired with the message shown when it is internal.
///
/// 400 and 404 errors carry their own message to the caller. Everything else
/// is logged in full and replaced by the route's public message.
#[derive(Debug)]
pub struct ApiError {
    source: TranslationError,
    public_message: &'static str,
}

impl ApiError {
    pub fn new(source: TranslationError, public_message: &'static str) -> Self {
        Self {
            source,
            public_message,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.source.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Unwrap a JSON body, answering rejections in the usual error shape
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(body)| body).map_err(|rejection| {
        debug!(error = %rejection, "rejected request body");
        TranslationError::invalid_input("Invalid request body.")
    })
}

fn with_message(public_message: &'static str) -> impl Fn(TranslationError) -> ApiError {
    move |source| ApiError::new(source, public_message)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, code, kind) = match status {
            StatusCode::BAD_REQUEST => (self.source.to_string(), "invalid_request", "invalid_request_error"),
            StatusCode::NOT_FOUND => (self.source.to_string(), "not_found", "invalid_request_error"),
            _ => {
                error!(error = %self.source, "request failed");
                (self.public_message.to_string(), "internal_error", "api_error")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                message,
                code: Some(code.to_string()),
                r#type: Some(kind.to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        list_models,
        upload_document,
        estimate_document,
        translate_document,
        download_document
    ),
    components(schemas(
        HealthResponse,
        ModelsResponse,
        ModelEntry,
        ModelSummary,
        UploadForm,
        UploadOutcome,
        EstimateBody,
        EstimateOutcome,
        TranslateBody,
        TranslationSummary,
        TargetLanguage,
        ProviderType,
        ErrorResponse,
        ErrorDetail
    )),
    tags((name = "documents", description = "Document upload, estimation, translation and download"))
)]
struct ApiDoc;

/// Health check handler
#[utoipa::path(get, path = "/", responses((status = 200, body = HealthResponse)))]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Get models handler
#[utoipa::path(get, path = "/api/models", responses((status = 200, body = ModelsResponse)))]
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list".to_string(),
        data: state.services.documents.catalog().all().to_vec(),
    })
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        debug!(error = %e, "unreadable multipart body");
        TranslationError::invalid_input("Invalid upload payload.")
    };

    let mut file = None;
    let mut target_language = None;
    let mut model_id = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document.txt").to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                file = Some((bytes.to_vec(), file_name, mime_type));
            }
            Some("targetLanguage") => {
                let raw = field.text().await.map_err(malformed)?;
                if !raw.trim().is_empty() {
                    target_language = Some(raw.trim().parse::<TargetLanguage>()?);
                }
            }
            Some("modelId") => {
                model_id = Some(field.text().await.map_err(malformed)?);
            }
            _ => {}
        }
    }

    let (bytes, file_name, mime_type) =
        file.ok_or_else(|| TranslationError::invalid_input("No file uploaded."))?;

    Ok(UploadRequest {
        bytes,
        file_name,
        mime_type,
        target_language,
        model_id,
    })
}

/// Upload a TXT document and estimate its translation cost
#[utoipa::path(
    post,
    path = "/api/documents",
    tag = "documents",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = UploadOutcome),
        (status = 400, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
async fn upload_document(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Json<UploadOutcome>, ApiError> {
    let request = read_upload(multipart).await.map_err(with_message(UPLOAD_FAILED))?;
    let outcome = state
        .services
        .documents
        .upload(request)
        .await
        .map_err(with_message(UPLOAD_FAILED))?;
    Ok(Json(outcome))
}

/// Re-estimate a stored document against another model
#[utoipa::path(
    post,
    path = "/api/documents/estimate",
    tag = "documents",
    request_body = EstimateBody,
    responses(
        (status = 200, body = EstimateOutcome),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
async fn estimate_document(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<EstimateBody>, JsonRejection>,
) -> std::result::Result<Json<EstimateOutcome>, ApiError> {
    let body = json_body(body).map_err(with_message(ESTIMATE_FAILED))?;
    let outcome = state
        .services
        .documents
        .estimate(
            body.document_id.as_deref().unwrap_or_default(),
            body.model_id.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(with_message(ESTIMATE_FAILED))?;
    Ok(Json(outcome))
}

fn sse_event(event: Result<TranslationEvent>) -> Event {
    match event {
        Ok(TranslationEvent::Fragment(delta)) => Event::default()
            .event("fragment")
            .data(json!({ "delta": delta }).to_string()),
        Ok(TranslationEvent::Summary(summary)) => {
            let data = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
            Event::default().event("summary").data(data)
        }
        Err(e) => {
            error!(error = %e, "translation stream failed");
            let message = match &e {
                TranslationError::EmptyTranslation => e.to_string(),
                _ => TRANSLATE_FAILED.to_string(),
            };
            Event::default()
                .event("error")
                .data(json!({ "error": message }).to_string())
        }
    }
}

/// Stream a translation as server-sent events.
///
/// Emits `fragment` events with `{"delta": ...}`, one `summary` event on
/// success or one `error` event on failure, then a final `done` event.
#[utoipa::path(
    post,
    path = "/api/translate",
    tag = "documents",
    request_body = TranslateBody,
    responses(
        (status = 200, description = "text/event-stream of fragment, summary, error and done events"),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
async fn translate_document(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<TranslateBody>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let body = json_body(body).map_err(with_message(TRANSLATE_FAILED))?;
    let target_language = body
        .target_language
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| raw.trim().parse::<TargetLanguage>())
        .transpose()
        .map_err(with_message(TRANSLATE_FAILED))?;

    let run = state
        .services
        .translator
        .start(TranslateRequest {
            document_id: body.document_id.unwrap_or_default(),
            model_id: body.model_id.unwrap_or_default(),
            target_language,
        })
        .await
        .map_err(with_message(TRANSLATE_FAILED))?;

    // Dropping the body on disconnect drops `run`, which cancels the translation
    let events = run
        .map(|event| Ok::<_, Infallible>(sse_event(event)))
        .chain(stream::once(async {
            Ok::<_, Infallible>(Event::default().event("done").data("[DONE]"))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

/// Download the latest translation of a document
#[utoipa::path(
    get,
    path = "/api/documents/download",
    tag = "documents",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Translated text as an attachment"),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
async fn download_document(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> std::result::Result<Response, ApiError> {
    let artifact = state
        .services
        .documents
        .download(query.document_id.as_deref().unwrap_or_default())
        .await
        .map_err(with_message(DOWNLOAD_FAILED))?;

    let headers = [
        (header::CONTENT_TYPE, artifact.mime_type.clone()),
        (header::CONTENT_DISPOSITION, artifact.content_disposition()),
    ];
    Ok((headers, artifact.bytes).into_response())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(health_check))
        .route("/api/models", get(list_models))
        .route(
            "/api/documents",
            post(upload_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/documents/estimate", post(estimate_document))
        .route("/api/documents/download", get(download_document))
        .route("/api/translate", post(translate_document))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run_server(host: String, port: u16, config: TranslatorConfig) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let app = build_router(AppState::new(services, &config));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!(
        %addr,
        storage_dir = %config.storage_dir.display(),
        models = config.models.len(),
        "starting server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
