//! Cognexia ingestion CLI
//!
//! Indexes a local PDF with the same pipeline the gateway uses for uploads.

use anyhow::Context;
use clap::Parser;
use cognexia_common::{
    config::AppConfig, embeddings::create_embedder, telemetry, vector_store::create_vector_store,
    VERSION,
};
use cognexia_ingestion::IngestionPipeline;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Index a PDF into the Cognexia vector store")]
struct Cli {
    /// PDF file to index
    pdf: PathBuf,

    /// Keep vectors from earlier ingestions instead of clearing the index
    #[arg(long)]
    keep_existing: bool,

    /// Only index the first N pages
    #[arg(long, env = "COGNEXIA_MAX_PAGES")]
    max_pages: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability);

    info!("Starting Cognexia ingestion v{}", VERSION);

    if cli.keep_existing {
        config.ingestion.wipe_before_ingest = false;
    }
    if cli.max_pages.is_some() {
        config.ingestion.max_pages = cli.max_pages;
    }

    let embedder = create_embedder(&config.embedding, &config.retry)?;
    let store =
        create_vector_store(&config.vector_store, &config.retry, embedder.dimension()).await?;
    info!(backend = store.backend(), model = embedder.model_name(), "Clients ready");

    let pipeline = IngestionPipeline::new(embedder, store, config.ingestion.clone());
    let report = pipeline
        .ingest_path(&cli.pdf)
        .await
        .with_context(|| format!("Failed to ingest {}", cli.pdf.display()))?;

    println!("{}", serde_json::json!({ "status": "success", "chunks": report.chunks }));
    info!(
        chunks = report.chunks,
        pages = report.pages,
        duration_ms = report.duration.as_millis() as u64,
        "Ingestion complete"
    );

    Ok(())
}
