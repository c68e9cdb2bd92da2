//! Ingestion pipeline
//!
//! Core logic for indexing a document: PDF extraction, chunking, embedding
//! and vector store upsert.

use crate::chunker::{split_pages, ChunkingConfig};
use crate::errors::IngestionError;
use crate::pdf::{load_pages, PageDocument};
use cognexia_common::config::IngestionConfig;
use cognexia_common::embeddings::Embedder;
use cognexia_common::metrics;
use cognexia_common::vector_store::{VectorRecord, VectorStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Outcome of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    /// Chunks written to the vector store
    pub chunks: usize,
    /// Pages read from the document
    pub pages: usize,
    /// Source document name
    pub source: String,
    #[serde(skip)]
    pub duration: Duration,
}

/// Load → split → embed → store
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: IngestionConfig,
    /// Held for a whole ingestion so a wipe never lands between another
    /// document's upserts
    running: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            running: Mutex::new(()),
        }
    }

    /// Index an in-memory PDF
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<IngestionReport, IngestionError> {
        let _running = self.running.lock().await;
        let start = Instant::now();
        info!("Ingesting document");

        if self.config.wipe_before_ingest {
            // A failed wipe must not block the new document
            if let Err(e) = self.store.delete_all().await {
                warn!(
                    error = %e,
                    backend = self.store.backend(),
                    "Failed to clear vector store, continuing"
                );
            }
        }

        // Parsing is CPU bound
        let owned = bytes.to_vec();
        let source = filename.to_string();
        let mut pages = tokio::task::spawn_blocking(move || load_pages(&owned, &source))
            .await
            .map_err(|e| IngestionError::Task(e.to_string()))??;

        if let Some(max_pages) = self.config.max_pages {
            if pages.len() > max_pages {
                debug!(total = pages.len(), max_pages, "Truncating document");
                pages.truncate(max_pages);
            }
        }

        let chunks = self.index_pages(&pages).await?;

        let report = IngestionReport {
            chunks,
            pages: pages.len(),
            source: filename.to_string(),
            duration: start.elapsed(),
        };

        metrics::record_ingestion(report.duration.as_secs_f64(), report.chunks, report.pages);

        info!(
            chunks = report.chunks,
            pages = report.pages,
            duration_ms = report.duration.as_millis() as u64,
            "Document ingested"
        );

        Ok(report)
    }

    /// Index a PDF on disk
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestionReport, IngestionError> {
        if !path.exists() {
            return Err(IngestionError::FileNotFound(path.display().to_string()));
        }

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        self.ingest(&bytes, &filename).await
    }

    /// Split, embed and upsert; returns the number of chunks written
    async fn index_pages(&self, pages: &[PageDocument]) -> Result<usize, IngestionError> {
        let chunks = split_pages(pages, &ChunkingConfig::from(&self.config))?;

        if chunks.is_empty() {
            warn!("No text extracted from document, nothing to index");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(IngestionError::Upstream(cognexia_common::AppError::Embedding {
                message: format!("Expected {} embeddings, got {}", chunks.len(), vectors.len()),
            }));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| VectorRecord::new(values, chunk.metadata()))
            .collect();

        let written = self.store.upsert(records).await?;
        debug!(written, backend = self.store.backend(), "Chunks upserted");

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::sample_pdf;
    use cognexia_common::embeddings::MockEmbedder;
    use cognexia_common::vector_store::InMemoryStore;
    use support::FailingStore;

    fn pipeline(store: Arc<dyn VectorStore>, config: IngestionConfig) -> IngestionPipeline {
        IngestionPipeline::new(Arc::new(MockEmbedder::new(64)), store, config)
    }

    #[tokio::test]
    async fn test_ingest_indexes_every_page() {
        let store = Arc::new(InMemoryStore::new());
        let pdf = sample_pdf(&[
            "Rust ownership rules",
            "Borrow checker details",
            "Lifetimes explained",
        ]);

        let report = tokio_test::assert_ok!(
            pipeline(store.clone(), IngestionConfig::default())
                .ingest(&pdf, "rust.pdf")
                .await
        );

        assert_eq!(report.pages, 3);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.source, "rust.pdf");
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ingest_replaces_previous_document() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(store.clone(), IngestionConfig::default());

        p.ingest(&sample_pdf(&["one", "two", "three"]), "first.pdf").await.unwrap();
        p.ingest(&sample_pdf(&["only page"]), "second.pdf").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keep_existing_accumulates() {
        let store = Arc::new(InMemoryStore::new());
        let config = IngestionConfig {
            wipe_before_ingest: false,
            ..IngestionConfig::default()
        };
        let p = pipeline(store.clone(), config);

        p.ingest(&sample_pdf(&["one"]), "a.pdf").await.unwrap();
        p.ingest(&sample_pdf(&["two"]), "b.pdf").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reingest_same_document_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let config = IngestionConfig {
            wipe_before_ingest: false,
            ..IngestionConfig::default()
        };
        let p = pipeline(store.clone(), config);
        let pdf = sample_pdf(&["same text", "more text"]);

        p.ingest(&pdf, "same.pdf").await.unwrap();
        p.ingest(&pdf, "same.pdf").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_max_pages_truncates() {
        let store = Arc::new(InMemoryStore::new());
        let config = IngestionConfig {
            max_pages: Some(2),
            ..IngestionConfig::default()
        };

        let report = pipeline(store.clone(), config)
            .ingest(&sample_pdf(&["p1", "p2", "p3", "p4"]), "long.pdf")
            .await
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 2);
    }

    #[tokio::test]
    async fn test_document_without_text_yields_zero_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let report = pipeline(store.clone(), IngestionConfig::default())
            .ingest(&sample_pdf(&[""]), "blank.pdf")
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.chunks, 0);
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let result = pipeline(store, IngestionConfig::default())
            .ingest(b"%PDF-garbage", "bad.pdf")
            .await;

        assert!(matches!(result, Err(IngestionError::PdfParse { .. })));
    }

    #[tokio::test]
    async fn test_wipe_failure_is_ignored() {
        let report = pipeline(Arc::new(FailingStore::default()), IngestionConfig::default())
            .ingest(&sample_pdf(&["still indexed"]), "doc.pdf")
            .await
            .unwrap();

        assert_eq!(report.chunks, 1);
    }

    #[tokio::test]
    async fn test_ingest_path_missing_file() {
        let store = Arc::new(InMemoryStore::new());
        let result = pipeline(store, IngestionConfig::default())
            .ingest_path(Path::new("/nonexistent/report.pdf"))
            .await;

        assert!(matches!(result, Err(IngestionError::FileNotFound(_))));
    }

    mod support {
        use cognexia_common::errors::{AppError, Result};
        use cognexia_common::vector_store::{InMemoryStore, ScoredChunk, VectorRecord, VectorStore};

        /// Store whose delete always fails
        #[derive(Default)]
        pub struct FailingStore {
            inner: InMemoryStore,
        }

        #[async_trait::async_trait]
        impl VectorStore for FailingStore {
            async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
                self.inner.upsert(records).await
            }

            async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
                self.inner.query(vector, top_k).await
            }

            async fn delete_all(&self) -> Result<()> {
                Err(AppError::VectorStore {
                    message: "namespace not found".to_string(),
                })
            }

            async fn count(&self) -> Result<u64> {
                self.inner.count().await
            }

            fn backend(&self) -> &'static str {
                "failing"
            }
        }
    }
}
