//! LLM provider abstraction.
//!
//! One trait, two production implementations (OpenAI, Anthropic), and
//! whatever deterministic stubs the tests need. The classifier only ever
//! sees `LlmProvider`, so swapping vendors is a config change.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::LlmError;

// ── Request types ───────────────────────────────────────────────────

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider to enforce a JSON object response where the API
    /// supports it. The prompt must still demand JSON; this is a backstop.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            json_response: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }
}

// ── Response types ──────────────────────────────────────────────────

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of output.
    Stop,
    /// Ran out of tokens. The content is truncated and must not be parsed
    /// as if complete.
    Length,
    Other,
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

// ── Provider trait ──────────────────────────────────────────────────

/// A chat-completion backend.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Vendor label recorded in usage analytics ("openai", "anthropic").
    fn provider_name(&self) -> &'static str;

    /// Model identifier, used for logging and cost lookup.
    fn model_name(&self) -> &str;

    /// (input, output) USD per token for this model.
    fn cost_per_token(&self) -> (Decimal, Decimal);

    /// Execute a completion request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

// ── Shared HTTP error mapping ───────────────────────────────────────

/// Map a non-success HTTP response to an `LlmError`.
///
/// 429 becomes `RateLimited` with the server's retry-after hint when it
/// sends one. 401/403 become `AuthFailed`. Everything else carries the
/// body text for diagnosis.
pub(crate) async fn error_from_response(
    provider: &'static str,
    response: reqwest::Response,
) -> LlmError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        };
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return LlmError::AuthFailed {
            provider: provider.to_string(),
        };
    }

    let body = response.text().await.unwrap_or_default();
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("HTTP {status}: {body}"),
    }
}
