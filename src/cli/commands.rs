//! CLI command definitions and handlers

use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::config::TranslatorConfig;
use crate::core::documents::UploadRequest;
use crate::core::models::TargetLanguage;
use crate::core::orchestrator::{TranslateRequest, TranslationEvent};
use crate::Services;

/// Commands for Doc Translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP API server
    Server {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Upload a TXT file and estimate its translation cost
    Upload {
        /// Path to the TXT file
        file: PathBuf,

        /// Target language (en or zh)
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Model id (see `models`)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Re-estimate an uploaded document against a model
    Estimate {
        /// Document id returned by `upload`
        document_id: String,

        #[arg(short, long)]
        model: String,
    },

    /// Translate an uploaded document, streaming the result to stdout
    Translate {
        /// Document id returned by `upload`
        document_id: String,

        #[arg(short, long)]
        model: String,

        /// Overrides the language chosen at upload
        #[arg(short, long)]
        target_lang: Option<String>,
    },

    /// Save the latest translation of a document
    Download {
        document_id: String,

        /// Output file (default: the artifact name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available models and their prices
    Models,
}

fn parse_language(raw: Option<String>) -> anyhow::Result<Option<TargetLanguage>> {
    Ok(raw.map(|lang| lang.parse::<TargetLanguage>()).transpose()?)
}

fn guess_mime_type(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.eq_ignore_ascii_case("txt"))
        .map(|_| "text/plain".to_string())
}

/// Handle server command
pub async fn handle_server(host: String, port: u16, config: TranslatorConfig) -> anyhow::Result<()> {
    use crate::server::api::run_server;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);
    println!("📄 OpenAPI document: http://{}:{}/api-docs/openapi.json", host, port);

    run_server(host, port, config).await
}

/// Handle upload command
pub async fn handle_upload(
    file: PathBuf,
    target_lang: Option<String>,
    model: Option<String>,
    config: &TranslatorConfig,
) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;

    let bytes = tokio::fs::read(&file).await?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.txt")
        .to_string();

    let outcome = services
        .documents
        .upload(UploadRequest {
            bytes,
            mime_type: guess_mime_type(&file),
            file_name,
            target_language: parse_language(target_lang)?,
            model_id: model,
        })
        .await?;

    println!("✅ Uploaded {}", outcome.name);
    println!("   Document id: {}", outcome.document_id);
    println!("   Size: {} bytes, {} page(s)", outcome.size, outcome.page_count);
    println!("   Target language: {}", outcome.target_language.label());
    println!("   Model: {} ({})", outcome.model.label, outcome.model_id);
    println!("   Estimated tokens: {}", outcome.estimated_tokens);
    println!("   Estimated cost: ${:.6}", outcome.estimated_cost);

    Ok(())
}

/// Handle estimate command
pub async fn handle_estimate(
    document_id: String,
    model: String,
    config: &TranslatorConfig,
) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;
    let outcome = services.documents.estimate(&document_id, &model).await?;

    println!("Model: {} ({})", outcome.model.label, outcome.model.id);
    println!("Estimated tokens: {}", outcome.estimated_tokens);
    println!("Estimated cost: ${:.6}", outcome.estimated_cost);

    Ok(())
}

/// Handle translate command
pub async fn handle_translate(
    document_id: String,
    model: String,
    target_lang: Option<String>,
    config: &TranslatorConfig,
) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Waiting for the first fragment...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut run = match services
        .translator
        .start(TranslateRequest {
            document_id,
            model_id: model,
            target_language: parse_language(target_lang)?,
        })
        .await
    {
        Ok(run) => run,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };

    let mut stdout = std::io::stdout();
    let summary = loop {
        let event = tokio::select! {
            event = run.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                pb.finish_and_clear();
                let state = run.cancel().await;
                eprintln!("\n⚠️  Translation cancelled ({state})");
                return Ok(());
            }
        };

        match event {
            Some(Ok(TranslationEvent::Fragment(text))) => {
                if !pb.is_finished() {
                    pb.finish_and_clear();
                }
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Some(Ok(TranslationEvent::Summary(summary))) => break summary,
            Some(Err(e)) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
            None => {
                pb.finish_and_clear();
                anyhow::bail!("Translation ended without a summary");
            }
        }
    };
    pb.finish_and_clear();

    eprintln!("\n\n✅ Translation completed!");
    eprintln!("   Model: {}", summary.model_label);
    eprintln!("   Target language: {}", summary.target_language.label());
    eprintln!("   Pages: {}", summary.page_count);
    eprintln!("   Tokens: {} in / {} out", summary.input_tokens, summary.output_tokens);
    eprintln!("   Cost: ${:.6}", summary.cost);
    eprintln!("   Time: {:?}", Duration::from_millis(summary.duration_ms));

    Ok(())
}

/// Handle download command
pub async fn handle_download(
    document_id: String,
    output: Option<PathBuf>,
    config: &TranslatorConfig,
) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;
    let artifact = services.documents.download(&document_id).await?;

    let output = output.unwrap_or_else(|| PathBuf::from(&artifact.name));
    tokio::fs::write(&output, &artifact.bytes).await?;

    println!("✅ Saved {} bytes to {}", artifact.bytes.len(), output.display());
    Ok(())
}

/// Handle models command
pub fn handle_models(config: &TranslatorConfig) {
    println!(
        "{:<24} {:<22} {:<10} {:>12} {:>12}",
        "ID", "LABEL", "PROVIDER", "IN $/1M", "OUT $/1M"
    );
    for model in &config.models {
        println!(
            "{:<24} {:<22} {:<10} {:>12.2} {:>12.2}",
            model.id,
            model.label,
            model.provider_type,
            model.price_per_million_input,
            model.price_per_million_output
        );
    }
}
