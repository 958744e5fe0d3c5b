//! OpenAI chat-completions provider.
//!
//! Plain reqwest against `/chat/completions`. Structured JSON output is
//! requested via `response_format` when the caller asks for it.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    error_from_response, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-request timeout. Classification calls are small; anything slower
/// than this is effectively down.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Point the provider at a different endpoint (proxies, tests).
    pub fn with_base_url(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_response {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::cost_per_token(&self.model)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: "openai".to_string(),
                reason: format!("body decode failed: {e}"),
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "openai".to_string(),
                reason: "no choices in response".to_string(),
            })?;

        Ok(CompletionResponse {
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            content: choice.message.content,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChatMessage;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(SecretString::from("sk-test"), "gpt-4o-mini")
    }

    #[test]
    fn body_carries_messages_and_options() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("you classify emails"),
            ChatMessage::user("Subject: refund"),
        ])
        .with_temperature(0.3)
        .with_max_tokens(512)
        .with_json_response();

        let body = provider().build_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Subject: refund");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn body_omits_unset_options() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let body = provider().build_body(&request);
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn response_wire_format_parses() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"intent\": \"unclear\"}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 820, "completion_tokens": 61, "total_tokens": 881}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"intent\": \"unclear\"}");
        assert_eq!(parsed.usage.prompt_tokens, 820);
        assert_eq!(parsed.usage.completion_tokens, 61);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(map_finish_reason(None), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(map_finish_reason(Some("content_filter")), FinishReason::Other);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p = OpenAiProvider::with_base_url(
            SecretString::from("sk-test"),
            "gpt-4o-mini",
            "http://127.0.0.1:9999/v1/",
        );
        assert_eq!(p.base_url, "http://127.0.0.1:9999/v1");
    }
}
