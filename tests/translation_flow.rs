//! End-to-end runs against scripted providers and a temporary store

use assert_json_diff::assert_json_include;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use doc_translator::core::config::default_models;
use doc_translator::core::cost::{round_cost, tokens_to_cost};
use doc_translator::core::orchestrator::TranslationState;
use doc_translator::providers::{ScriptedBehavior, ScriptedProvider};
use doc_translator::{
    ProviderRegistry, ProviderType, Services, TargetLanguage, TranslateRequest, TranslationError,
    TranslationEvent, TranslatorConfig, UploadRequest,
};

const GEMINI: &str = "gemini-2.5-flash";
const SONNET: &str = "claude-sonnet-4-5";

struct Harness {
    _dir: TempDir,
    config: TranslatorConfig,
    services: Services,
    google: ScriptedProvider,
    anthropic: ScriptedProvider,
}

fn harness_with(google: ScriptedProvider, fail_on_empty_translation: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = TranslatorConfig {
        storage_dir: dir.path().join("uploads"),
        models: default_models(),
        fail_on_empty_translation,
        ..Default::default()
    };
    let anthropic = ScriptedProvider::new(ProviderType::Anthropic, vec!["Bonjour"]);
    let providers = ProviderRegistry::new()
        .with(Arc::new(google.clone()))
        .with(Arc::new(anthropic.clone()));

    Harness {
        services: Services::with_providers(&config, providers),
        _dir: dir,
        config,
        google,
        anthropic,
    }
}

fn harness(google: ScriptedProvider) -> Harness {
    harness_with(google, false)
}

fn upload_request(text: &str, language: TargetLanguage) -> UploadRequest {
    UploadRequest {
        bytes: text.as_bytes().to_vec(),
        file_name: "report.txt".to_string(),
        mime_type: Some("text/plain".to_string()),
        target_language: Some(language),
        model_id: Some(GEMINI.to_string()),
    }
}

fn translate(document_id: Uuid, model_id: &str) -> TranslateRequest {
    TranslateRequest {
        document_id: document_id.to_string(),
        model_id: model_id.to_string(),
        target_language: None,
    }
}

#[tokio::test]
async fn test_upload_translate_and_persist() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["你好", "世界"]);
    let h = harness(google);
    let source = "a".repeat(4000);

    let upload = assert_ok!(h.services.documents.upload(upload_request(&source, TargetLanguage::Zh)).await);
    assert_eq!(upload.page_count, 2);
    assert_eq!(upload.estimated_tokens, 1000);
    assert_eq!(upload.model_id, GEMINI);

    let run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    assert_eq!(run.document_id(), upload.document_id);
    let completed = assert_ok!(run.collect_translation().await);

    assert_eq!(completed.text, "你好世界");
    assert_eq!(completed.summary.page_count, 2);
    assert_eq!(completed.summary.input_tokens, 1000);
    assert_eq!(completed.summary.output_tokens, 1);
    assert_eq!(completed.summary.model_label, "Gemini 2.5 Flash");
    assert_eq!(completed.summary.target_language, TargetLanguage::Zh);

    let store = h.services.documents.store();
    let metadata = std::fs::read(store.metadata_path(upload.document_id)).unwrap();
    let metadata: serde_json::Value = serde_json::from_slice(&metadata).unwrap();
    assert_json_include!(
        actual: metadata,
        expected: json!({
            "documentId": upload.document_id.to_string(),
            "name": "report.txt",
            "extension": ".txt",
            "size": 4000,
            "targetLanguage": "zh",
            "modelId": GEMINI,
            "estimatedTokens": 1000,
            "pageCount": 2,
            "translation": {
                "documentId": upload.document_id.to_string(),
                "mimeType": "text/plain",
                "name": "report-zh.txt"
            }
        })
    );

    let artifact = std::fs::read_to_string(store.artifact_path(upload.document_id)).unwrap();
    assert_eq!(artifact, "你好世界");
}

#[tokio::test]
async fn test_summary_cost_matches_price_table() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["你好", "世界"]);
    let h = harness(google);

    let upload = assert_ok!(
        h.services
            .documents
            .upload(upload_request(&"a".repeat(4000), TargetLanguage::Zh))
            .await
    );
    let completed = assert_ok!(
        assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await)
            .collect_translation()
            .await
    );

    let expected = round_cost(tokens_to_cost(1000, 0.3) + tokens_to_cost(1, 2.5));
    assert_eq!(completed.summary.cost, expected);
}

#[tokio::test]
async fn test_unknown_document_is_not_found_without_provider_calls() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let err = assert_err!(h.services.translator.start(translate(Uuid::new_v4(), GEMINI)).await);
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.to_string(), "Document metadata missing.");
    assert_eq!(h.google.generate_calls(), 0);
    assert_eq!(h.google.count_calls(), 0);
}

#[tokio::test]
async fn test_unknown_model_is_rejected_before_touching_storage() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let err = assert_err!(h.services.translator.start(translate(Uuid::new_v4(), "gpt-9")).await);
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "Unknown model selected.");
    assert!(!h.config.storage_dir.exists());
    assert_eq!(h.google.generate_calls(), 0);
    assert_eq!(h.anthropic.generate_calls(), 0);
}

#[tokio::test]
async fn test_missing_selection_is_rejected() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let err = assert_err!(
        h.services
            .translator
            .start(TranslateRequest {
                document_id: "  ".to_string(),
                model_id: GEMINI.to_string(),
                target_language: None,
            })
            .await
    );
    assert_eq!(err.status_code(), 400);

    let err = assert_err!(
        h.services
            .translator
            .start(TranslateRequest {
                document_id: "not-a-uuid".to_string(),
                model_id: GEMINI.to_string(),
                target_language: None,
            })
            .await
    );
    assert_eq!(err.to_string(), "Invalid document id.");
}

#[tokio::test]
async fn test_cancel_mid_stream_discards_output() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["first", "second", "third"])
        .with_behavior(ScriptedBehavior::StallAfter { after: 1 });
    let h = harness(google);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let mut run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);

    match run.next_event().await {
        Some(Ok(TranslationEvent::Fragment(text))) => assert_eq!(text, "first"),
        other => panic!("expected a fragment, got {other:?}"),
    }
    assert_eq!(run.state(), TranslationState::Streaming);

    let state = run.cancel().await;
    assert_eq!(state, TranslationState::Failed);
    assert!(h.google.stream_dropped());

    let store = h.services.documents.store();
    let record = assert_ok!(store.read_metadata(upload.document_id).await).unwrap();
    assert!(record.translation.is_none());
    assert!(!store.artifact_path(upload.document_id).exists());
}

#[tokio::test]
async fn test_dropping_stream_cancels_run() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["first", "second"])
        .with_behavior(ScriptedBehavior::StallAfter { after: 1 });
    let h = harness(google);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let mut run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    assert!(run.next().await.is_some());
    drop(run);

    for _ in 0..100 {
        if h.google.stream_dropped() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(h.google.stream_dropped());
    assert!(!h.services.documents.store().artifact_path(upload.document_id).exists());
}

#[tokio::test]
async fn test_provider_failure_mid_stream() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["one", "two", "three"])
        .with_behavior(ScriptedBehavior::FailAfter { after: 2 });
    let h = harness(google);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    let events: Vec<_> = run.collect().await;

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], Ok(TranslationEvent::Fragment(t)) if t == "one"));
    assert!(matches!(&events[1], Ok(TranslationEvent::Fragment(t)) if t == "two"));
    assert!(matches!(&events[2], Err(TranslationError::Provider { .. })));

    let record = assert_ok!(h.services.documents.store().read_metadata(upload.document_id).await).unwrap();
    assert!(record.translation.is_none());
}

#[tokio::test]
async fn test_provider_rejection_surfaces_from_start() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["x"])
        .with_behavior(ScriptedBehavior::FailOnStart);
    let h = harness(google);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let err = assert_err!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    assert_eq!(err.status_code(), 500);
    assert!(!err.is_user_facing());
}

#[tokio::test]
async fn test_empty_output_completes_with_empty_artifact() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, Vec::<String>::new()));

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::Zh)).await);
    let completed = assert_ok!(
        assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await)
            .collect_translation()
            .await
    );
    assert_eq!(completed.text, "");
    assert_eq!(completed.summary.output_tokens, 0);

    let downloaded = assert_ok!(h.services.documents.download(&upload.document_id.to_string()).await);
    assert!(downloaded.bytes.is_empty());
}

#[tokio::test]
async fn test_empty_output_can_fail_the_run() {
    let h = harness_with(ScriptedProvider::new(ProviderType::Google, Vec::<String>::new()), true);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::Zh)).await);
    let run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    let err = assert_err!(run.collect_translation().await);
    assert!(matches!(err, TranslationError::EmptyTranslation));
    assert!(!h.services.documents.store().artifact_path(upload.document_id).exists());
}

#[tokio::test]
async fn test_target_language_override_names_artifact() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["Hello"]));

    let upload = assert_ok!(h.services.documents.upload(upload_request("你好", TargetLanguage::Zh)).await);
    let run = assert_ok!(
        h.services
            .translator
            .start(TranslateRequest {
                target_language: Some(TargetLanguage::En),
                ..translate(upload.document_id, GEMINI)
            })
            .await
    );
    let completed = assert_ok!(run.collect_translation().await);
    assert_eq!(completed.summary.target_language, TargetLanguage::En);

    let downloaded = assert_ok!(h.services.documents.download(&upload.document_id.to_string()).await);
    assert_eq!(downloaded.name, "report-en.txt");
}

#[tokio::test]
async fn test_estimate_against_another_model() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let upload = assert_ok!(
        h.services
            .documents
            .upload(upload_request(&"a".repeat(4000), TargetLanguage::Zh))
            .await
    );
    let estimate = assert_ok!(
        h.services
            .documents
            .estimate(&upload.document_id.to_string(), SONNET)
            .await
    );

    assert_eq!(estimate.estimated_tokens, 1000);
    assert_eq!(estimate.estimated_cost, round_cost(tokens_to_cost(1000, 3.0) + tokens_to_cost(1000, 15.0)));
    assert_eq!(estimate.model.id, SONNET);
    assert_eq!(h.anthropic.count_calls(), 1);

    let err = assert_err!(h.services.documents.estimate(&upload.document_id.to_string(), "gpt-9").await);
    assert_eq!(err.status_code(), 400);
    let err = assert_err!(h.services.documents.estimate(&Uuid::new_v4().to_string(), SONNET).await);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_upload_without_credentials_estimates_zero() {
    let google = ScriptedProvider::new(ProviderType::Google, vec!["x"])
        .with_behavior(ScriptedBehavior::MissingCredential);
    let h = harness(google);

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    assert_eq!(upload.estimated_tokens, 0);
    assert_eq!(upload.estimated_cost, 0.0);
}

#[tokio::test]
async fn test_upload_validation() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let err = assert_err!(
        h.services
            .documents
            .upload(UploadRequest {
                file_name: "report.pdf".to_string(),
                mime_type: Some("application/pdf".to_string()),
                ..upload_request("hello", TargetLanguage::En)
            })
            .await
    );
    assert_eq!(err.to_string(), "Only TXT uploads are supported.");

    let err = assert_err!(h.services.documents.upload(upload_request("   ", TargetLanguage::En)).await);
    assert_eq!(err.status_code(), 400);

    let err = assert_err!(
        h.services
            .documents
            .upload(UploadRequest {
                model_id: Some("gpt-9".to_string()),
                ..upload_request("hello", TargetLanguage::En)
            })
            .await
    );
    assert_eq!(err.to_string(), "Unknown model selected.");
    assert!(!h.config.storage_dir.exists());
}

#[tokio::test]
async fn test_download_before_translation_is_not_found() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["x"]));

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let err = assert_err!(h.services.documents.download(&upload.document_id.to_string()).await);
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.to_string(), "Translated document not found.");

    let err = assert_err!(h.services.documents.download("").await);
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_concurrent_runs_leave_valid_metadata() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["same", " text"]));

    let upload = assert_ok!(h.services.documents.upload(upload_request("hello", TargetLanguage::En)).await);
    let first = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    let second = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);

    let (a, b) = tokio::join!(first.collect_translation(), second.collect_translation());
    assert_ok!(a);
    assert_ok!(b);

    let record = assert_ok!(h.services.documents.store().read_metadata(upload.document_id).await).unwrap();
    assert_eq!(record.translation.map(|t| t.name).as_deref(), Some("report-en.txt"));

    let downloaded = assert_ok!(h.services.documents.download(&upload.document_id.to_string()).await);
    assert_eq!(downloaded.bytes, b"same text");
}

#[tokio::test]
async fn test_failed_artifact_write_still_completes_run() {
    let h = harness(ScriptedProvider::new(ProviderType::Google, vec!["Hello", " there"]));

    let upload = assert_ok!(h.services.documents.upload(upload_request("你好", TargetLanguage::En)).await);
    let store = h.services.documents.store();
    std::fs::create_dir_all(store.artifact_path(upload.document_id)).unwrap();

    let run = assert_ok!(h.services.translator.start(translate(upload.document_id, GEMINI)).await);
    let completed = assert_ok!(run.collect_translation().await);
    assert_eq!(completed.text, "Hello there");
    assert_eq!(completed.summary.model_label, "Gemini 2.5 Flash");

    let record = assert_ok!(store.read_metadata(upload.document_id).await).unwrap();
    assert!(record.translation.is_none());
}
