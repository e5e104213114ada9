//! Bounded, defensive text completion.

use crate::client::{LlmClient, LlmRequest};
use nimbus_common::{NimbusError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Run a single-turn completion with a hard timeout.
///
/// Empty completions are treated as failures so callers can fall back.
pub async fn complete_prompt(
    client: &dyn LlmClient,
    system: Option<&str>,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    let request = LlmRequest::prompt(system, prompt).with_temperature(0.2);

    let response = match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                model = %client.model_name(),
                timeout_ms = timeout.as_millis() as u64,
                "LLM completion timed out"
            );
            return Err(NimbusError::Timeout(format!(
                "completion from {} exceeded {}ms",
                client.model_name(),
                timeout.as_millis()
            )));
        }
    };

    let text = response.content.trim();
    if text.is_empty() {
        return Err(NimbusError::Llm("model returned an empty completion".into()));
    }

    debug!(model = %response.model, chars = text.len(), "LLM completion received");
    Ok(text.to_string())
}

/// Pull the first balanced `{...}` object out of free-form model output.
///
/// Models wrap JSON in prose or code fences; braces inside string literals
/// are skipped.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmResponse;
    use async_trait::async_trait;

    struct FixedClient {
        reply: String,
        delay: Duration,
    }

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "fixed".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn returns_trimmed_text() {
        let client = FixedClient {
            reply: "  hello \n".into(),
            delay: Duration::ZERO,
        };
        let text = complete_prompt(&client, None, "hi", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let client = FixedClient {
            reply: "late".into(),
            delay: Duration::from_secs(30),
        };
        let err = complete_prompt(&client, None, "hi", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::Timeout(_)));
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let client = FixedClient {
            reply: "   ".into(),
            delay: Duration::ZERO,
        };
        let err = complete_prompt(&client, None, "hi", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::Llm(_)));
    }

    #[test]
    fn extracts_json_from_fenced_prose() {
        let text = "Sure! ```json\n{\"intents\": [\"weather\"], \"note\": \"a } brace\"}\n``` done";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["intents"][0], "weather");
        assert_eq!(value["note"], "a } brace");
    }

    #[test]
    fn no_json_yields_none() {
        assert!(extract_json_object("I think it's about weather.").is_none());
        assert!(extract_json_object("{ unterminated").is_none());
    }
}
