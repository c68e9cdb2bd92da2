//! Retry policy for upstream HTTP services
//!
//! Transport failures, 429 and 5xx responses are retried with exponential
//! backoff; every other failure is returned immediately.

use crate::config::RetryConfig;
use crate::errors::AppError;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Failure of a single upstream attempt
#[derive(Debug)]
pub enum Attempt {
    /// Worth retrying
    Transient(AppError),
    /// Retrying cannot help
    Permanent(AppError),
}

impl Attempt {
    /// Classify an HTTP error status
    pub fn from_status(status: StatusCode, error: AppError) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Attempt::Transient(error)
        } else {
            Attempt::Permanent(error)
        }
    }

    /// Classify a transport error
    pub fn from_transport(err: &reqwest::Error, error: AppError) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Attempt::Transient(error)
        } else {
            Attempt::Permanent(error)
        }
    }

    fn into_backoff(self) -> backoff::Error<AppError> {
        match self {
            Attempt::Transient(e) => backoff::Error::transient(e),
            Attempt::Permanent(e) => backoff::Error::permanent(e),
        }
    }
}

/// Build the backoff schedule for a config
pub fn policy(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_interval_ms))
        .with_max_interval(Duration::from_millis(config.max_interval_ms))
        .with_max_elapsed_time(Some(Duration::from_secs(config.max_elapsed_secs)))
        .build()
}

/// Run `operation` until it succeeds, fails permanently, or the policy gives up
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    service: &str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt>>,
{
    if config.max_elapsed_secs == 0 {
        return operation().await.map_err(|attempt| match attempt {
            Attempt::Transient(e) | Attempt::Permanent(e) => e,
        });
    }

    let notify = |err: AppError, wait: Duration| {
        tracing::warn!(
            service = service,
            error = %err,
            retry_in_ms = wait.as_millis() as u64,
            "Upstream request failed, retrying"
        );
    };

    backoff::future::retry_notify(
        policy(config),
        || {
            let fut = operation();
            async move { fut.await.map_err(Attempt::into_backoff) }
        },
        notify,
    )
    .await
}
