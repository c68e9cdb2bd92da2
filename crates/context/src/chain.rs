//! Retrieval-augmented answer chain
//!
//! question → embed → nearest chunks → prompt → chat model

use crate::prompt::{PromptError, PromptTemplate};
use cognexia_common::embeddings::Embedder;
use cognexia_common::errors::{AppError, Result};
use cognexia_common::llm::ChatModel;
use cognexia_common::metrics;
use cognexia_common::vector_store::{ScoredChunk, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Generated answer with the chunks it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,

    /// Retrieved chunks, best match first
    pub sources: Vec<ScoredChunk>,
}

/// Join chunk texts with a blank line between them
pub fn format_docs(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct RagChain {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
}

impl RagChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        prompt: PromptTemplate,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            prompt,
        }
    }

    /// Answer a question from the `top_k` nearest chunks.
    ///
    /// An empty index still reaches the model, with an empty context, so the
    /// template's fallback answer applies.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<RagAnswer> {
        let start = Instant::now();
        let result = self.run(question, top_k).await;

        let retrieved = result.as_ref().map(|a| a.sources.len()).unwrap_or(0);
        metrics::record_chat(start.elapsed().as_secs_f64(), retrieved, result.is_ok());

        if let Ok(answer) = &result {
            info!(
                retrieved,
                answer_len = answer.answer.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Question answered"
            );
        }

        result
    }

    async fn run(&self, question: &str, top_k: usize) -> Result<RagAnswer> {
        let query_vector = self.embedder.embed(question).await?;
        let sources = self.store.query(&query_vector, top_k).await?;
        debug!(retrieved = sources.len(), backend = self.store.backend(), "Chunks retrieved");

        let context = format_docs(&sources);
        let prompt = self.prompt.render(&context, question);
        let answer = self.llm.complete(&prompt).await?;

        Ok(RagAnswer { answer, sources })
    }
}

impl From<PromptError> for AppError {
    fn from(e: PromptError) -> Self {
        AppError::Configuration {
            message: e.to_string(),
        }
    }
}
