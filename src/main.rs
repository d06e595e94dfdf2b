//! Main entry point for the Doc Translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use doc_translator::cli::commands::{self, Commands};
use doc_translator::TranslatorConfig;

/// Doc Translator - streaming document translation with cost estimates
#[derive(Parser, Debug)]
#[command(name = "doc-translator", version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file (credentials still come from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Console logging plus an optional file sink at `LOG_FILE_PATH`
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), log_level).into())
    };

    let (file_layer, guard) = match std::env::var("LOG_FILE_PATH").ok().filter(|p| !p.is_empty()) {
        Some(path) => {
            let path = Path::new(&path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter()))
        .with(file_layer)
        .init();

    guard
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TranslatorConfig> {
    let config = match path {
        Some(path) => TranslatorConfig::from_file(path)?,
        None => TranslatorConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    let verbose = args.verbose || matches!(args.command, Some(Commands::Server { debug: true, .. }));
    let _log_guard = init_logging(verbose);

    let config = load_config(args.config.as_deref())?;

    // Execute command
    match args.command {
        Some(Commands::Server { host, port, .. }) => {
            commands::handle_server(host, port, config).await?;
        }
        Some(Commands::Upload {
            file,
            target_lang,
            model,
        }) => {
            commands::handle_upload(file, target_lang, model, &config).await?;
        }
        Some(Commands::Estimate { document_id, model }) => {
            commands::handle_estimate(document_id, model, &config).await?;
        }
        Some(Commands::Translate {
            document_id,
            model,
            target_lang,
        }) => {
            commands::handle_translate(document_id, model, target_lang, &config).await?;
        }
        Some(Commands::Download { document_id, output }) => {
            commands::handle_download(document_id, output, &config).await?;
        }
        Some(Commands::Models) => {
            commands::handle_models(&config);
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
