//! Text chunking module
//!
//! Splits page text into overlapping chunks for embedding. Splitting is
//! recursive over semantic levels: paragraphs, then lines, sentences and
//! words, so chunks break at the coarsest boundary that fits.

use crate::errors::IngestionError;
use crate::pdf::PageDocument;
use cognexia_common::config::IngestionConfig;
use cognexia_common::vector_store::ChunkMetadata;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl From<&IngestionConfig> for ChunkingConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// A text chunk with its page metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// The chunk content
    pub content: String,
    /// Zero-based page the chunk came from
    pub page: u32,
    /// Page count of the source document
    pub total_pages: u32,
    /// Source document name
    pub source: String,
    /// Index of this chunk in the document
    pub index: u32,
}

impl DocumentChunk {
    /// Metadata stored next to the chunk vector
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            text: self.content.clone(),
            page: self.page,
            total_pages: self.total_pages,
            source: self.source.clone(),
            chunk_index: self.index,
        }
    }
}

/// Split every page into chunks.
///
/// Chunks never span pages; indices run contiguously across the document.
pub fn split_pages(
    pages: &[PageDocument],
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestionError> {
    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| IngestionError::Chunking(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks = Vec::new();
    for page in pages {
        for content in splitter.chunks(&page.text) {
            if content.trim().is_empty() {
                continue;
            }

            chunks.push(DocumentChunk {
                content: content.to_string(),
                page: page.page,
                total_pages: page.total_pages,
                source: page.source.clone(),
                index: chunks.len() as u32,
            });
        }
    }

    debug!(
        pages = pages.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Text chunked"
    );

    Ok(chunks)
}
