//! Question answering handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use cognexia_common::{
    errors::{AppError, Result},
    vector_store::ScoredChunk,
};

/// Longest excerpt returned per source
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Chunks to retrieve (defaults to retrieval.top_k)
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize)]
pub struct SourceRef {
    pub page: u32,
    pub source: String,
    pub score: f32,
    pub excerpt: String,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            page: chunk.metadata.page,
            source: chunk.metadata.source.clone(),
            score: chunk.score,
            excerpt: chunk.metadata.text.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

/// Answer a question from the indexed document
pub async fn chat(
    State(state): State<AppState>,
    request: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = request.map_err(|e| AppError::Validation {
        message: e.body_text(),
        field: None,
    })?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    if request.query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "query must not be blank".to_string(),
            field: Some("query".to_string()),
        });
    }

    let retrieval = &state.config.retrieval;
    let top_k = request.top_k.unwrap_or(retrieval.top_k);
    if top_k == 0 || top_k > retrieval.max_top_k {
        return Err(AppError::Validation {
            message: format!("top_k must be between 1 and {}", retrieval.max_top_k),
            field: Some("top_k".to_string()),
        });
    }

    let answer = state.chain.answer(&request.query, top_k).await?;

    Ok(Json(ChatResponse {
        answer: answer.answer,
        sources: answer.sources.iter().map(SourceRef::from).collect(),
    }))
}
