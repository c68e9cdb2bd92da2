//! Chat model abstraction
//!
//! Provides:
//! - OpenAI-compatible chat completions (Groq, OpenAI, local servers)
//! - A recording mock for tests and offline runs

use crate::config::{LlmConfig, RetryConfig};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::{with_retry, Attempt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for text generation from a single rendered prompt
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the prompt as a user message and return the reply text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Chat completions client for OpenAI-compatible APIs
pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry: RetryConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiCompatibleChat {
    /// Create a new chat client
    pub fn new(config: &LlmConfig, retry: RetryConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: format!("API key required for LLM provider {}", config.provider),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry,
        })
    }

    async fn call(&self, prompt: &str) -> std::result::Result<String, Attempt> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let err = AppError::Llm {
                    message: format!("LLM API request failed: {}", e),
                };
                Attempt::from_transport(&e, err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::from_status(
                status,
                AppError::Llm {
                    message: format!("LLM API error {}: {}", status, body),
                },
            ));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            Attempt::Permanent(AppError::Llm {
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                Attempt::Permanent(AppError::Llm {
                    message: "Empty response from LLM".to_string(),
                })
            })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let result = with_retry(&self.retry, "llm", move || self.call(prompt)).await;
        metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock chat model returning a fixed answer and remembering every prompt
pub struct MockChatModel {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl MockChatModel {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new("I don't know.")
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat model based on configuration
pub fn create_chat_model(config: &LlmConfig, retry: &RetryConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "groq" | "openai" | "openai-compatible" => {
            Ok(Arc::new(OpenAiCompatibleChat::new(config, retry.clone())?))
        }
        "mock" => Ok(Arc::new(MockChatModel::default())),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> LlmConfig {
        LlmConfig {
            api_base: base.to_string(),
            api_key: Some("gsk-test".to_string()),
            ..LlmConfig::default()
        }
    }

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_elapsed_secs: 0,
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_completion_sends_prompt_as_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama-3.1-8b-instant",
                "temperature": 0.0,
                "messages": [{ "role": "user", "content": "What is RAG?" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Retrieval-augmented generation." }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/openai/v1", server.uri());
        let chat = OpenAiCompatibleChat::new(&config(&base), no_retry()).unwrap();
        let answer = chat.complete("What is RAG?").await.unwrap();
        assert_eq!(answer, "Retrieval-augmented generation.");
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let chat = OpenAiCompatibleChat::new(&config(&server.uri()), no_retry()).unwrap();
        let err = chat.complete("hello").await.unwrap_err();
        assert!(matches!(err, AppError::Llm { .. }));
    }

    #[test]
    fn test_missing_api_key() {
        let mut cfg = config("https://api.groq.com/openai/v1");
        cfg.api_key = None;
        assert!(matches!(
            OpenAiCompatibleChat::new(&cfg, no_retry()),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let mock = MockChatModel::new("42");
        assert_eq!(mock.complete("first").await.unwrap(), "42");
        mock.complete("second").await.unwrap();
        assert_eq!(mock.prompts(), vec!["first".to_string(), "second".to_string()]);
    }
}
