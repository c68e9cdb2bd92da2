//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metrics prefix for all Cognexia metrics
pub const METRICS_PREFIX: &str = "cognexia";

/// Buckets for request latency (in seconds); LLM calls dominate the tail
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
];

/// Install the Prometheus recorder and describe all metrics
pub fn install_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(LATENCY_BUCKETS)?
        .install_recorder()?;
    register_metrics();
    Ok(handle)
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents ingested"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document ingestion latency in seconds"
    );

    // Chat metrics
    describe_counter!(
        format!("{}_chat_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions answered"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end question answering latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieved_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks retrieved per question"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    // Vector store metrics
    describe_counter!(
        format!("{}_vector_store_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector store operations"
    );

    describe_histogram!(
        format!("{}_vector_store_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector store operation latency in seconds"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    tracing::info!("Metrics registered");
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, chunks_created: usize, pages: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX)).increment(chunks_created as u64);

    histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        "pages" => page_bucket(pages)
    )
    .record(duration_secs);
}

/// Coarse page-count label to keep cardinality bounded
fn page_bucket(pages: usize) -> &'static str {
    match pages {
        0 => "0",
        1..=5 => "1-5",
        6..=20 => "6-20",
        21..=100 => "21-100",
        _ => "100+",
    }
}

/// Helper to record chat metrics
pub fn record_chat(duration_secs: f64, retrieved: usize, success: bool) {
    counter!(
        format!("{}_chat_queries_total", METRICS_PREFIX),
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(format!("{}_chat_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if success {
        histogram!(format!("{}_retrieved_chunks", METRICS_PREFIX)).record(retrieved as f64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }

    tracing::trace!(model, batch_size, success, "Embedding request recorded");
}

/// Helper to record vector store metrics
pub fn record_vector_store(
    operation: &'static str,
    backend: &'static str,
    duration_secs: f64,
    success: bool,
) {
    counter!(
        format!("{}_vector_store_operations_total", METRICS_PREFIX),
        "operation" => operation,
        "backend" => backend,
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(
        format!("{}_vector_store_duration_seconds", METRICS_PREFIX),
        "operation" => operation,
        "backend" => backend
    )
    .record(duration_secs);
}

/// Record the outcome of a vector store call and pass its result through
pub fn observe_vector_store<T, E>(
    operation: &'static str,
    backend: &'static str,
    start: Instant,
    result: Result<T, E>,
) -> Result<T, E> {
    record_vector_store(operation, backend, start.elapsed().as_secs_f64(), result.is_ok());
    result
}

/// Helper to record LLM metrics
pub fn record_llm(duration_secs: f64, model: &str, success: bool) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}
