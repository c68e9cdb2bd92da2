//! In-memory vector store using brute-force cosine similarity

use super::{cosine_similarity, ScoredChunk, VectorRecord, VectorStore};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store, contents are lost on restart
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let written = records.len();
        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(record.id.clone(), record);
        }
        Ok(written)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let guard = self.records.read().await;

        let mut scored: Vec<ScoredChunk> = guard
            .values()
            .map(|record| ScoredChunk {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_all(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
