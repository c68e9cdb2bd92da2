//! Cognexia Ingestion
//!
//! Turns a PDF into indexed chunks:
//! 1. Loads one document per page
//! 2. Splits pages into overlapping chunks
//! 3. Embeds the chunks
//! 4. Upserts them into the vector store

pub mod chunker;
pub mod errors;
pub mod pdf;
pub mod processor;

pub use chunker::{split_pages, ChunkingConfig, DocumentChunk};
pub use errors::IngestionError;
pub use pdf::{load_pages, load_pages_from_path, PageDocument};
pub use processor::{IngestionPipeline, IngestionReport};
