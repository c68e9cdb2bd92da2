//! Configuration management for Cognexia services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Provider variables (PINECONE_API_KEY, GROQ_API_KEY, ...)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Document ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Retry policy for upstream services
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Largest accepted request body (PDF uploads)
    pub max_upload_bytes: usize,

    /// Shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    pub provider: String,

    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// Model to use
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Texts per embedding request
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Backend: pinecone, pgvector, memory
    pub backend: String,

    /// Pinecone API key
    pub api_key: Option<String>,

    /// Pinecone index name
    pub index_name: Option<String>,

    /// Pinecone index host (resolved from the control plane when absent)
    pub index_host: Option<String>,

    /// Pinecone control plane URL
    pub control_plane_url: String,

    /// Pinecone namespace
    pub namespace: String,

    /// Vectors per upsert request
    pub upsert_batch_size: usize,

    /// Postgres URL for the pgvector backend
    pub database_url: Option<String>,

    /// Table holding chunk vectors (pgvector)
    pub table: String,

    /// Pool size (pgvector)
    pub max_connections: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider: groq, openai, mock
    pub provider: String,

    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Optional completion token cap
    pub max_tokens: Option<u32>,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Prompt template override; must contain {context} and {question}
    pub prompt_template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between neighbouring chunks in characters
    pub chunk_overlap: usize,

    /// Only index the first N pages
    pub max_pages: Option<usize>,

    /// Clear the index before every ingestion
    pub wipe_before_ingest: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question
    pub top_k: usize,

    /// Upper bound a client may request
    pub max_top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Give up after this long (0 disables retries)
    pub max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Requests per second
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full filter directive
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_max_upload() -> usize { 25 * 1024 * 1024 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_embedding_base() -> String { "http://127.0.0.1:8080/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_batch() -> usize { 32 }
fn default_vector_backend() -> String { "pinecone".to_string() }
fn default_control_plane() -> String { "https://api.pinecone.io".to_string() }
fn default_upsert_batch() -> usize { 100 }
fn default_table() -> String { "document_chunks".to_string() }
fn default_pg_connections() -> u32 { 5 }
fn default_vector_timeout() -> u64 { 30 }
fn default_llm_provider() -> String { "groq".to_string() }
fn default_llm_base() -> String { "https://api.groq.com/openai/v1".to_string() }
fn default_llm_model() -> String { crate::DEFAULT_CHAT_MODEL.to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_top_k() -> usize { 5 }
fn default_max_top_k() -> usize { 20 }
fn default_log_level() -> String { "info".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_base: default_embedding_base(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_embedding_batch(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            api_key: None,
            index_name: None,
            index_host: None,
            control_plane_url: default_control_plane(),
            namespace: String::new(),
            upsert_batch_size: default_upsert_batch(),
            database_url: None,
            table: default_table(),
            max_connections: default_pg_connections(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_base: default_llm_base(),
            api_key: None,
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            prompt_template: None,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_pages: None,
            wipe_before_ingest: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 200,
            max_interval_ms: 2_000,
            max_elapsed_secs: 10,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 10,
            burst: 20,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_enabled: true,
        }
    }
}

/// Provider variables honoured on top of the APP__ namespace
const PROVIDER_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PINECONE_API_KEY", "vector_store.api_key"),
    ("PINECONE_INDEX_NAME", "vector_store.index_name"),
    ("PINECONE_INDEX_HOST", "vector_store.index_host"),
    ("GROQ_API_KEY", "llm.api_key"),
    ("DATABASE_URL", "vector_store.database_url"),
];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in PROVIDER_ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ingestion = &self.ingestion;
        if ingestion.chunk_size == 0 {
            return Err(ConfigError::Message("ingestion.chunk_size must be positive".into()));
        }
        if ingestion.chunk_overlap >= ingestion.chunk_size {
            return Err(ConfigError::Message(format!(
                "ingestion.chunk_overlap ({}) must be smaller than chunk_size ({})",
                ingestion.chunk_overlap, ingestion.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 || self.retrieval.top_k > self.retrieval.max_top_k {
            return Err(ConfigError::Message(format!(
                "retrieval.top_k must be within 1..={}",
                self.retrieval.max_top_k
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Message("embedding.dimension must be positive".into()));
        }
        if self.embedding.batch_size == 0 || self.vector_store.upsert_batch_size == 0 {
            return Err(ConfigError::Message("batch sizes must be positive".into()));
        }
        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.embedding.model, "BAAI/bge-small-en-v1.5");
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.ingestion.chunk_overlap = config.ingestion.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_k_bounds() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        config.retrieval.top_k = config.retrieval.max_top_k + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("ingestion.chunk_size", 2000)
            .unwrap()
            .set_override("ingestion.chunk_overlap", 100)
            .unwrap()
            .set_override("ingestion.max_pages", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.ingestion.chunk_size, 2000);
        assert_eq!(config.ingestion.max_pages, Some(5));
        assert!(config.ingestion.wipe_before_ingest);
        assert_eq!(config.vector_store.backend, "pinecone");
    }

    // The only test in this crate that touches process environment
    #[test]
    fn test_provider_variables_win_over_app_namespace() {
        let vars = [
            ("APP__VECTOR_STORE__API_KEY", "from-app"),
            ("APP__SERVER__PORT", "9001"),
            ("APP__INGESTION__MAX_PAGES", "5"),
            ("PINECONE_API_KEY", "pk"),
            ("PINECONE_INDEX_NAME", "docs"),
            ("PINECONE_INDEX_HOST", "docs-abc.svc.pinecone.io"),
            ("GROQ_API_KEY", "gk"),
            ("DATABASE_URL", "postgres://localhost/cognexia"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let result = AppConfig::load();

        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = result.unwrap();
        assert_eq!(config.vector_store.api_key.as_deref(), Some("pk"));
        assert_eq!(config.vector_store.index_name.as_deref(), Some("docs"));
        assert_eq!(
            config.vector_store.index_host.as_deref(),
            Some("docs-abc.svc.pinecone.io")
        );
        assert_eq!(config.llm.api_key.as_deref(), Some("gk"));
        assert_eq!(
            config.vector_store.database_url.as_deref(),
            Some("postgres://localhost/cognexia")
        );
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.ingestion.max_pages, Some(5));
    }
}
