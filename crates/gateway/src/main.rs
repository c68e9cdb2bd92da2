//! Cognexia API Gateway
//!
//! The HTTP entry point for document upload and question answering.
//! Handles:
//! - PDF ingestion and chat routes
//! - Rate limiting
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use cognexia_common::{
    config::AppConfig,
    embeddings::{create_embedder, Embedder},
    errors::Result,
    llm::{create_chat_model, ChatModel},
    metrics, telemetry,
    vector_store::{create_vector_store, VectorStore},
};
use cognexia_context::{PromptTemplate, RagChain};
use cognexia_ingestion::IngestionPipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn VectorStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub chain: Arc<RagChain>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the ingestion pipeline and answer chain around shared clients
    pub fn new(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let prompt = match &config.llm.prompt_template {
            Some(template) => PromptTemplate::new(template.clone())?,
            None => PromptTemplate::default(),
        };

        let pipeline =
            IngestionPipeline::new(embedder.clone(), store.clone(), config.ingestion.clone());
        let chain = RagChain::new(embedder, store.clone(), llm, prompt);

        Ok(Self {
            config: Arc::new(config),
            store,
            pipeline: Arc::new(pipeline),
            chain: Arc::new(chain),
            metrics,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability);

    info!("Starting Cognexia API Gateway v{}", cognexia_common::VERSION);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        Some(metrics::install_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };

    // Upstream clients
    let embedder = create_embedder(&config.embedding, &config.retry)?;
    let store =
        create_vector_store(&config.vector_store, &config.retry, embedder.dimension()).await?;
    let llm = create_chat_model(&config.llm, &config.retry)?;
    info!(
        embedding_model = embedder.model_name(),
        vector_store = store.backend(),
        chat_model = llm.model_name(),
        "Clients initialized"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = config.shutdown_timeout();

    // Create app state
    let state = AppState::new(config, embedder, store, llm, metrics_handle)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Document and question routes
    let mut api_routes = Router::new()
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/chat", post(handlers::chat::chat));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(&state.config.rate_limit);
        api_routes = api_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit,
        ));
    }

    let body_limit = state.config.server.max_upload_bytes;

    // Compose the app
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .merge(api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
///
/// In-flight requests get `timeout` to finish before the process exits.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(timeout_secs = timeout.as_secs(), "Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use cognexia_common::config::RateLimitConfig;
    use cognexia_common::embeddings::MockEmbedder;
    use cognexia_common::llm::MockChatModel;
    use cognexia_common::vector_store::InMemoryStore;
    use cognexia_ingestion::pdf::testing::sample_pdf;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cognexia-test-boundary";

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        config
    }

    fn app_with(config: AppConfig) -> (Router, Arc<InMemoryStore>, Arc<MockChatModel>) {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockChatModel::new("Grounded answer."));
        let state = AppState::new(
            config,
            Arc::new(MockEmbedder::new(4096)),
            store.clone(),
            llm.clone(),
            None,
        )
        .unwrap();
        (create_router(state), store, llm)
    }

    fn app() -> Router {
        app_with(test_config()).0
    }

    fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/ingest")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let response = tokio_test::assert_ok!(app().oneshot(get("/")).await);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "Cognexia System Online");
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let response = tokio_test::assert_ok!(app().oneshot(get("/health")).await);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_vector_store() {
        let response = app().oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["vector_store"]["backend"], "memory");
        assert_eq!(body["checks"]["vector_store"]["vectors"], 0);
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_not_found() {
        let response = app().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_then_chat() {
        let (app, store, llm) = app_with(test_config());
        let pdf = sample_pdf(&[
            "Cognexia indexes uploaded documents",
            "The warranty period is two years from purchase",
        ]);

        let response = tokio_test::assert_ok!(
            app.clone()
                .oneshot(upload_request("file", "manual.pdf", &pdf))
                .await
        );
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["chunks"], 2);
        assert_eq!(body["pages"], 2);
        assert_eq!(body["source"], "manual.pdf");
        assert_eq!(store.count().await.unwrap(), 2);

        let question = serde_json::json!({
            "query": "How long is the warranty period?",
            "top_k": 1
        });
        let response = tokio_test::assert_ok!(app.oneshot(chat_request(question)).await);
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["answer"], "Grounded answer.");
        let sources = body["sources"].as_array().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0]["page"], 1);
        assert_eq!(sources[0]["source"], "manual.pdf");
        assert!(sources[0]["excerpt"].as_str().unwrap().contains("warranty"));

        assert!(llm.prompts()[0].contains("warranty period"));
    }

    #[tokio::test]
    async fn test_ingest_requires_file_field() {
        let pdf = sample_pdf(&["text"]);
        let response = app().oneshot(upload_request("document", "a.pdf", &pdf)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "MISSING_FIELD");
        assert_eq!(body["error"]["field"], "file");
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_pdf() {
        let response = app()
            .oneshot(upload_request("file", "notes.txt", b"just some notes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_multipart() {
        let request = Request::builder()
            .method("POST")
            .uri("/ingest")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = tokio_test::assert_ok!(app().oneshot(request).await);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_ingest_oversized_upload() {
        let mut config = test_config();
        config.server.max_upload_bytes = 1024;
        let (app, _, _) = app_with(config);

        let mut data = b"%PDF-1.5\n".to_vec();
        data.resize(8192, b'x');
        let response = app.oneshot(upload_request("file", "big.pdf", &data)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_ingest_corrupt_pdf_is_server_error_with_message() {
        let response = app()
            .oneshot(upload_request("file", "broken.pdf", b"%PDF-1.5 but nothing else"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "DOCUMENT_ERROR");
        assert!(body["error"]["message"].as_str().unwrap().contains("broken.pdf"));
    }

    #[tokio::test]
    async fn test_chat_validation() {
        let app = app();

        let cases = [
            serde_json::json!({ "query": "" }),
            serde_json::json!({ "query": "   " }),
            serde_json::json!({ "query": "x".repeat(4001) }),
            serde_json::json!({ "query": "ok", "top_k": 0 }),
            serde_json::json!({ "query": "ok", "top_k": 21 }),
            serde_json::json!({ "question": "wrong field" }),
        ];

        for case in cases {
            let response = app.clone().oneshot(chat_request(case.clone())).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "case: {}", case);
            assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_chat_on_empty_index() {
        let (app, _, llm) = app_with(test_config());
        let response = app
            .oneshot(chat_request(serde_json::json!({ "query": "Anything there?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["sources"].as_array().unwrap().len(), 0);
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = test_config();
        config.rate_limit = RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst: 1,
        };
        let (app, _, _) = app_with(config);

        let first = app
            .clone()
            .oneshot(chat_request(serde_json::json!({ "query": "one" })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(chat_request(serde_json::json!({ "query": "two" })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(second).await["error"]["code"], "RATE_LIMITED");

        // Health checks are not limited
        let health = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[test]
    fn test_bad_prompt_override_is_rejected() {
        let mut config = test_config();
        config.llm.prompt_template = Some("No placeholders here".to_string());
        let result = AppState::new(
            config,
            Arc::new(MockEmbedder::new(8)),
            Arc::new(InMemoryStore::new()),
            Arc::new(MockChatModel::default()),
            None,
        );
        assert!(result.is_err());
    }
}
