use std::path::Path;
use std::sync::Arc;

use permit_desk::analytics::{Aggregator, AnalyticsLogger};
use permit_desk::api::{api_routes, ApiState};
use permit_desk::classify::{Classifier, LlmClassifier};
use permit_desk::config::{AiProvider, Settings};
use permit_desk::desk::{DeskAuth, DeskClient};
use permit_desk::llm::{create_provider, LlmBackend, LlmConfig};
use permit_desk::pipeline::TicketProcessor;
use permit_desk::store::CorrectionStore;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    // Log to stdout and a daily-rotated file under the log directory.
    // The guard flushes the file writer on shutdown.
    let file_appender = tracing_appender::rolling::daily(&settings.log_dir, "service.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(file_writer.and(std::io::stdout))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %settings.ai.model,
        "Starting permit-desk"
    );

    let backend = match settings.ai.provider {
        AiProvider::OpenAi => LlmBackend::OpenAi,
        AiProvider::Anthropic => LlmBackend::Anthropic,
    };
    let llm = create_provider(&LlmConfig {
        backend,
        api_key: settings.ai.api_key.clone(),
        model: settings.ai.model.clone(),
        base_url: settings.ai.base_url.clone(),
    });

    let analytics = Arc::new(AnalyticsLogger::new(&settings.log_dir));
    let classifier: Arc<dyn Classifier> = Arc::new(
        LlmClassifier::new(llm)
            .with_review_threshold(settings.human_review_threshold)
            .with_analytics(analytics.clone()),
    );

    let auth = Arc::new(DeskAuth::new(&settings.desk));
    let desk = Arc::new(DeskClient::new(&settings.desk, auth).with_analytics(analytics.clone()));

    let corrections = Arc::new(
        CorrectionStore::new_local(
            Path::new(&settings.corrections_db),
            Path::new(&settings.log_dir).join("corrections.jsonl"),
        )
        .await?,
    );

    let processor = Arc::new(TicketProcessor::new(
        desk.clone(),
        classifier.clone(),
        analytics.clone(),
        corrections.clone(),
    ));
    let aggregator = Arc::new(Aggregator::new(&settings.log_dir));

    let state = ApiState {
        desk,
        classifier,
        processor,
        corrections,
        aggregator,
        pipeline_permits: Arc::new(Semaphore::new(settings.pipeline_concurrency)),
    };

    let listener =
        tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, api_routes(state)).await?;

    Ok(())
}
