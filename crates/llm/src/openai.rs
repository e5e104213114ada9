//! OpenAI-compatible chat-completions client.
//!
//! Ollama exposes the same `/v1/chat/completions` endpoint, so one client
//! covers a local model and the hosted API.

use async_trait::async_trait;
use nimbus_common::{NimbusError, Result};
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            base_url,
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: Self::wire_role(m.role),
            content: &m.content,
        }));

        ChatCompletionBody {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut http_req = self.http_client.post(&url).json(&self.body(&request));
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| NimbusError::Llm(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(NimbusError::Llm(format!(
                "chat completion API error {status}: {body_text}"
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| NimbusError::Llm(format!("unparseable chat completion: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NimbusError::Llm("chat completion had no choices".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_puts_system_first() {
        let client = OpenAiClient::new(None, "llama3".to_string(), None);
        let request = LlmRequest::prompt(Some("Be terse."), "Weather in Oslo?").with_max_tokens(64);

        let json = serde_json::to_value(client.body(&request)).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["max_tokens"], 64);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Weather in Oslo?");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn default_base_url_is_local_ollama() {
        let client = OpenAiClient::new(None, "llama3".to_string(), None);
        assert_eq!(client.base_url, OLLAMA_BASE_URL);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = OpenAiClient::new(Some("http://ollama:11434/".into()), "llama3".into(), None);
        assert_eq!(client.base_url, "http://ollama:11434");
    }
}
