use std::sync::Arc;

use anyhow::Context;
use bank_rag::{CsvLoader, RagPipeline};
use bank_rag_server::{AppState, ServerConfig, Settings, run_server};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter())),
        )
        .init();

    let config = settings.rag_config()?;
    let pipeline = RagPipeline::builder()
        .loader(Arc::new(CsvLoader::new(&config.data_path)))
        .embedder(settings.embedder(&config)?)
        .generator(settings.generator(&config)?)
        .config(config)
        .build()?;

    info!(data = %pipeline.config().data_path.display(), "building knowledge base index");
    pipeline.initialize().await.context("failed to initialize the RAG pipeline")?;

    run_server(
        ServerConfig { host: settings.host.clone(), port: settings.port },
        AppState::new(Arc::new(pipeline)),
    )
    .await
}
