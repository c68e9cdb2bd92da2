//! Ingestion error types

use cognexia_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {document}: {message}")]
    PdfParse { document: String, message: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding or vector store failure
    #[error(transparent)]
    Upstream(#[from] AppError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::PdfParse { .. } => AppError::Document {
                message: e.to_string(),
            },
            IngestionError::Chunking(message) => AppError::Chunking { message },
            IngestionError::FileNotFound(path) => AppError::Validation {
                message: format!("File not found: {}", path),
                field: None,
            },
            IngestionError::Task(message) => AppError::Internal { message },
            IngestionError::Io(err) => AppError::from(err),
            IngestionError::Upstream(err) => err,
        }
    }
}
