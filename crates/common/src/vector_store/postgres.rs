//! Vector similarity search using pgvector

use super::{ChunkMetadata, ScoredChunk, VectorRecord, VectorStore};
use crate::config::VectorStoreConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::{Duration, Instant};
use tracing::info;

const BACKEND: &str = "pgvector";

/// Postgres table of chunk vectors, searched by cosine distance
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
}

impl PgVectorStore {
    /// Connect and make sure the extension and table exist
    pub async fn connect(config: &VectorStoreConfig, dimension: usize) -> Result<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "vector_store.database_url (DATABASE_URL) required for pgvector".to_string(),
        })?;

        if !is_valid_identifier(&config.table) {
            return Err(AppError::Configuration {
                message: format!("Invalid table name: {}", config.table),
            });
        }

        info!(table = %config.table, "Connecting to pgvector store...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.timeout_secs))
            .connect(url)
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("Failed to connect to Postgres: {}", e),
            })?;

        let store = Self {
            pool,
            table: config.table.clone(),
        };
        store.ensure_schema(dimension).await?;
        Ok(store)
    }

    async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                embedding vector({dimension}) NOT NULL,
                content TEXT NOT NULL,
                page INTEGER NOT NULL,
                total_pages INTEGER NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL
            )
            "#,
            table = self.table,
            dimension = dimension
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Upsert every record in one transaction
    async fn write_rows(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let sql = format!(
            r#"
            INSERT INTO {table} (id, embedding, content, page, total_pages, source, chunk_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                content = EXCLUDED.content,
                page = EXCLUDED.page,
                total_pages = EXCLUDED.total_pages,
                source = EXCLUDED.source,
                chunk_index = EXCLUDED.chunk_index
            "#,
            table = self.table
        );

        let mut tx = self.pool.begin().await?;
        let written = records.len();
        for record in records {
            sqlx::query(&sql)
                .bind(&record.id)
                .bind(Vector::from(record.values))
                .bind(&record.metadata.text)
                .bind(record.metadata.page as i32)
                .bind(record.metadata.total_pages as i32)
                .bind(&record.metadata.source)
                .bind(record.metadata.chunk_index as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(written)
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let start = Instant::now();
        let result = self.write_rows(records).await;
        metrics::observe_vector_store("upsert", BACKEND, start, result)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let start = Instant::now();
        let sql = format!(
            r#"
            SELECT
                id,
                content,
                page,
                total_pages,
                source,
                chunk_index,
                1 - (embedding <=> $1) AS score
            FROM {table}
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
            table = self.table
        );

        let rows = sqlx::query(&sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await;

        metrics::observe_vector_store("query", BACKEND, start, rows)?
            .iter()
            .map(|row| -> Result<ScoredChunk> {
                Ok(ScoredChunk {
                    id: row.try_get("id")?,
                    score: row.try_get::<f64, _>("score")? as f32,
                    metadata: ChunkMetadata {
                        text: row.try_get("content")?,
                        page: row.try_get::<i32, _>("page")? as u32,
                        total_pages: row.try_get::<i32, _>("total_pages")? as u32,
                        source: row.try_get("source")?,
                        chunk_index: row.try_get::<i32, _>("chunk_index")? as u32,
                    },
                })
            })
            .collect()
    }

    async fn delete_all(&self) -> Result<()> {
        let start = Instant::now();
        let result = sqlx::query(&format!("TRUNCATE {}", self.table))
            .execute(&self.pool)
            .await;
        metrics::observe_vector_store("delete_all", BACKEND, start, result)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await;
        let count = metrics::observe_vector_store("count", BACKEND, start, result)?;
        Ok(count as u64)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn is_valid_identifier(name: &str) -> bool {
    regex_lite::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("document_chunks"));
        assert!(is_valid_identifier("_chunks2"));
        assert!(!is_valid_identifier("chunks; DROP TABLE users"));
        assert!(!is_valid_identifier("2chunks"));
        assert!(!is_valid_identifier(""));
    }

    #[tokio::test]
    async fn test_connect_requires_database_url() {
        let config = VectorStoreConfig {
            backend: "pgvector".to_string(),
            database_url: None,
            ..VectorStoreConfig::default()
        };
        assert!(matches!(
            PgVectorStore::connect(&config, 384).await,
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unreachable_database_calls_are_recorded() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            tokio_test::block_on(async {
                let pool = PgPoolOptions::new()
                    .acquire_timeout(Duration::from_millis(200))
                    .connect_lazy("postgres://cognexia@127.0.0.1:1/cognexia")
                    .unwrap();
                let store = PgVectorStore {
                    pool,
                    table: "document_chunks".to_string(),
                };

                assert!(store.count().await.is_err());
                assert!(store.delete_all().await.is_err());
            })
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"operation="count""#));
        assert!(rendered.contains(r#"operation="delete_all""#));
        assert!(rendered.contains(r#"backend="pgvector""#));
        assert!(rendered.contains(r#"status="error""#));
    }

    #[test]
    fn test_vector_conversion() {
        let vector = Vector::from(vec![0.1, 0.2, 0.3]);
        assert_eq!(vector.as_slice(), &[0.1, 0.2, 0.3]);
    }
}
