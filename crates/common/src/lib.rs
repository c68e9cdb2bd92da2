//! Cognexia Common Library
//!
//! Shared code for the Cognexia ingestion pipeline, question answering
//! chain and HTTP gateway:
//! - Configuration management
//! - Error types and handling
//! - Embedding client abstraction
//! - Vector store backends
//! - Chat model client
//! - Retry policy for upstream calls
//! - Metrics and logging setup

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retry;
pub mod telemetry;
pub mod vector_store;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ChatModel;
pub use vector_store::VectorStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
