use std::sync::Arc;

use async_trait::async_trait;
use nimbus_common::{NimbusError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::{OPENAI_BASE_URL, OpenAiClient};
use crate::retry::{RetryConfig, RetryingClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Per-completion budget; callers never wait longer than this.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_max_concurrent() -> usize {
    2
}

impl LlmConfig {
    /// A local Ollama model with default limits.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider: "ollama".into(),
            model: model.into(),
            api_key: None,
            api_url: None,
            timeout_ms: default_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
            retry: RetryConfig::default(),
        }
    }

    /// Explicit key first, then `OPENAI_API_KEY` for the hosted provider.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        match self.provider.as_str() {
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| NimbusError::Llm(format!("semaphore closed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Build the retrying, concurrency-limited client described by `config`.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "ollama" => Box::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            None,
        )),
        "openai" => {
            let api_key = config.resolve_api_key().ok_or_else(|| {
                NimbusError::Config(
                    "openai provider requires api_key or OPENAI_API_KEY".to_string(),
                )
            })?;
            Box::new(OpenAiClient::new(
                Some(
                    config
                        .api_url
                        .clone()
                        .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                ),
                config.model.clone(),
                Some(api_key),
            ))
        }
        other => {
            return Err(NimbusError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    info!(provider = %config.provider, model = %config.model, "Language model configured");

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    Ok(Arc::new(SemaphoredClient::new(
        Arc::from(retrying),
        config.max_concurrent_requests,
    )))
}
