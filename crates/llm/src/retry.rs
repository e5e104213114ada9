use async_trait::async_trait;
use nimbus_common::{NimbusError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((base as u64).min(self.max_delay_ms))
    }
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Rate limits, 5xx responses and transport timeouts are worth retrying;
    /// anything else (bad key, malformed request) is not.
    fn is_retryable(error: &NimbusError) -> bool {
        match error {
            NimbusError::Timeout(_) => true,
            NimbusError::Llm(msg) => {
                let lower = msg.to_lowercase();
                ["429", "rate limit", "500", "502", "503", "504", "timed out", "connection"]
                    .iter()
                    .any(|needle| lower.contains(needle))
            }
            _ => false,
        }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.config.max_retries && Self::is_retryable(&e) => {
                    let delay = self.config.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying LLM request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures_left: AtomicU32,
        error: fn() -> NimbusError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(LlmResponse {
                content: "ok".to_string(),
                model: "flaky".to_string(),
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn retryable_error_detection() {
        type C = RetryingClient<FlakyClient>;
        assert!(C::is_retryable(&NimbusError::Llm("API error 429 Too Many Requests".into())));
        assert!(C::is_retryable(&NimbusError::Llm("503 Service Unavailable".into())));
        assert!(C::is_retryable(&NimbusError::Timeout("slow".into())));
        assert!(!C::is_retryable(&NimbusError::Llm("API error 401 Unauthorized".into())));
        assert!(!C::is_retryable(&NimbusError::Config("bad".into())));
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 2000,
            backoff_multiplier: 10.0,
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(500));
        assert_eq!(config.delay_for(4), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let client = RetryingClient::new(
            FlakyClient {
                failures_left: AtomicU32::new(2),
                error: || NimbusError::Llm("502 bad gateway".into()),
                calls: AtomicU32::new(0),
            },
            RetryConfig::default(),
        );
        let response = client.complete(LlmRequest::default()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let client = RetryingClient::new(
            FlakyClient {
                failures_left: AtomicU32::new(1),
                error: || NimbusError::Llm("401 Unauthorized".into()),
                calls: AtomicU32::new(0),
            },
            RetryConfig::default(),
        );
        assert!(client.complete(LlmRequest::default()).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }
}
