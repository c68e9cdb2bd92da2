//! Pinecone vector store over the REST data plane
//!
//! Chunk text is kept in the `text` metadata field next to page and source
//! information, the layout LangChain-style Pinecone clients read and write.

use super::{ChunkMetadata, ScoredChunk, VectorRecord, VectorStore};
use crate::config::{RetryConfig, VectorStoreConfig};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::{with_retry, Attempt};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const API_VERSION: &str = "2024-07";

/// Pinecone index client
pub struct PineconeStore {
    client: reqwest::Client,
    api_key: String,
    index_name: Option<String>,
    control_plane_url: String,
    namespace: String,
    batch_size: usize,
    retry: RetryConfig,
    host: OnceCell<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: Map<String, Value>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

impl PineconeStore {
    /// Create a client; the index host is resolved on first use if not configured
    pub fn new(config: &VectorStoreConfig, retry: RetryConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "Pinecone API key required (PINECONE_API_KEY)".to_string(),
        })?;

        if config.index_host.is_none() && config.index_name.is_none() {
            return Err(AppError::Configuration {
                message: "Pinecone index name (PINECONE_INDEX_NAME) or host required".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let host = match config.index_host {
            Some(ref host) => OnceCell::new_with(Some(normalize_host(host))),
            None => OnceCell::new(),
        };

        Ok(Self {
            client,
            api_key,
            index_name: config.index_name.clone(),
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            batch_size: config.upsert_batch_size.max(1),
            retry,
            host,
        })
    }

    /// Data plane host, looked up from the control plane once
    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let name = self.index_name.as_deref().ok_or_else(|| AppError::Configuration {
                    message: "Pinecone index name required to resolve host".to_string(),
                })?;
                let url = format!("{}/indexes/{}", self.control_plane_url, name);

                let description: IndexDescription = with_retry(&self.retry, "pinecone", || {
                    self.send(self.client.get(&url))
                })
                .await?;

                info!(index = name, host = %description.host, "Resolved Pinecone index host");
                Ok::<_, AppError>(normalize_host(&description.host))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.host().await?, path);
        with_retry(&self.retry, "pinecone", || self.send(self.client.post(&url).json(body))).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<T, Attempt> {
        let response = request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| {
                let err = AppError::VectorStore {
                    message: format!("Pinecone request failed: {}", e),
                };
                Attempt::from_transport(&e, err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::from_status(
                status,
                AppError::VectorStore {
                    message: format!("Pinecone error {}: {}", status, body),
                },
            ));
        }

        response.json().await.map_err(|e| {
            Attempt::Permanent(AppError::VectorStore {
                message: format!("Failed to parse Pinecone response: {}", e),
            })
        })
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let start = Instant::now();
        let mut written = 0;

        for batch in records.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| PineconeVector {
                        id: &r.id,
                        values: &r.values,
                        metadata: metadata_to_value(&r.metadata),
                    })
                    .collect(),
                namespace: &self.namespace,
            };

            let response: Result<UpsertResponse> = self.post("/vectors/upsert", &request).await;
            let response = response.inspect_err(|_| {
                let elapsed = start.elapsed().as_secs_f64();
                metrics::record_vector_store("upsert", self.backend(), elapsed, false)
            })?;
            debug!(
                batch = batch.len(),
                upserted = response.upserted_count,
                "Pinecone upsert batch"
            );
            written += response.upserted_count;
        }

        metrics::record_vector_store("upsert", self.backend(), start.elapsed().as_secs_f64(), true);
        Ok(written)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let start = Instant::now();
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
        };

        let response: Result<QueryResponse> = self.post("/query", &request).await;
        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_vector_store("query", self.backend(), elapsed, response.is_ok());

        let mut chunks: Vec<ScoredChunk> = response?
            .matches
            .into_iter()
            .filter_map(|m| {
                let metadata = m.metadata.as_ref().and_then(metadata_from_map);
                if metadata.is_none() {
                    debug!(id = %m.id, "Skipping match without chunk text");
                }
                metadata.map(|metadata| ScoredChunk {
                    id: m.id,
                    score: m.score,
                    metadata,
                })
            })
            .collect();

        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        chunks.truncate(top_k);
        Ok(chunks)
    }

    async fn delete_all(&self) -> Result<()> {
        let start = Instant::now();
        let body = json!({ "deleteAll": true, "namespace": self.namespace });
        let result: Result<Value> = self.post("/vectors/delete", &body).await;
        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_vector_store("delete_all", self.backend(), elapsed, result.is_ok());
        result.map(|_| ())
    }

    async fn count(&self) -> Result<u64> {
        let start = Instant::now();
        let stats: Result<IndexStats> = self.post("/describe_index_stats", &json!({})).await;
        let stats = metrics::observe_vector_store("count", self.backend(), start, stats)?;

        if self.namespace.is_empty() {
            return Ok(stats.total_vector_count);
        }
        Ok(stats
            .namespaces
            .get(&self.namespace)
            .and_then(|ns| ns.get("vectorCount"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    fn backend(&self) -> &'static str {
        "pinecone"
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn metadata_to_value(metadata: &ChunkMetadata) -> Value {
    json!({
        "text": metadata.text,
        "page": metadata.page,
        "total_pages": metadata.total_pages,
        "source": metadata.source,
        "chunk_index": metadata.chunk_index,
    })
}

/// Pinecone returns numeric metadata as floats; read it leniently
fn metadata_from_map(map: &Map<String, Value>) -> Option<ChunkMetadata> {
    let number = |key: &str| {
        map.get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .unwrap_or(0) as u32
    };

    Some(ChunkMetadata {
        text: map.get("text")?.as_str()?.to_string(),
        page: number("page"),
        total_pages: number("total_pages"),
        source: map
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        chunk_index: number("chunk_index"),
    })
}
