//! Cognexia Context
//!
//! Question answering over indexed chunks: retrieve the nearest chunks,
//! render them into a grounded prompt and ask the chat model.

pub mod chain;
pub mod prompt;

pub use chain::{format_docs, RagAnswer, RagChain};
pub use prompt::{PromptError, PromptTemplate, DEFAULT_TEMPLATE};
