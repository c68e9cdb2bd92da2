//! Vector store abstraction
//!
//! Chunks are stored with their embedding and page metadata. Backends:
//! - Pinecone (managed index, REST data plane)
//! - Postgres with pgvector
//! - In-memory (tests and local runs)

mod memory;
mod postgres;
mod pinecone;

pub use memory::InMemoryStore;
pub use postgres::PgVectorStore;
pub use pinecone::PineconeStore;

use crate::config::{RetryConfig, VectorStoreConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Metadata persisted next to every chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunk content
    pub text: String,

    /// Zero-based page the chunk was taken from
    pub page: u32,

    /// Page count of the source document
    pub total_pages: u32,

    /// Source document name
    pub source: String,

    /// Position of the chunk within the document
    pub chunk_index: u32,
}

/// A vector ready to be written
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Build a record whose id is derived from its content and position,
    /// so re-ingesting a document overwrites instead of duplicating
    pub fn new(values: Vec<f32>, metadata: ChunkMetadata) -> Self {
        Self {
            id: record_id(&metadata),
            values,
            metadata,
        }
    }
}

/// A stored chunk returned by a similarity query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,

    /// Similarity score, higher is closer
    pub score: f32,

    pub metadata: ChunkMetadata,
}

/// Common trait for all vector store backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records, returning how many were written
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Nearest chunks to `vector`, best first, at most `top_k`
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove every stored vector
    async fn delete_all(&self) -> Result<()>;

    /// Number of stored vectors
    async fn count(&self) -> Result<u64>;

    /// Backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Deterministic record id: sha256 over source, page, index and text
pub fn record_id(metadata: &ChunkMetadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metadata.source.as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.page.to_le_bytes());
    hasher.update(metadata.chunk_index.to_le_bytes());
    hasher.update(metadata.text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Create a vector store based on configuration
pub async fn create_vector_store(
    config: &VectorStoreConfig,
    retry: &RetryConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "pinecone" => Ok(Arc::new(PineconeStore::new(config, retry.clone())?)),
        "pgvector" | "postgres" => Ok(Arc::new(PgVectorStore::connect(config, dimension).await?)),
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown vector store backend: {}", other),
        }),
    }
}
