//! LLM integration.
//!
//! Supports:
//! - **OpenAI**: chat-completions API
//! - **Anthropic**: messages API
//!
//! Both are plain reqwest clients behind the `LlmProvider` trait; the
//! classifier never knows which vendor it is talking to. `retry` wraps
//! calls with backoff at the orchestration layer, and `costs` prices
//! token usage for the analytics log.

pub mod anthropic;
mod costs;
pub mod openai;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use provider::*;
pub use retry::{with_retry, RetryPolicy, RetryableError};

use std::sync::Arc;

use secrecy::SecretString;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    /// Endpoint override for proxies and tests; `None` uses the vendor URL.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    match config.backend {
        LlmBackend::OpenAi => {
            let provider = match &config.base_url {
                Some(url) => {
                    OpenAiProvider::with_base_url(config.api_key.clone(), &config.model, url)
                }
                None => OpenAiProvider::new(config.api_key.clone(), &config.model),
            };
            tracing::info!("Using OpenAI (model: {})", config.model);
            Arc::new(provider)
        }
        LlmBackend::Anthropic => {
            let provider = match &config.base_url {
                Some(url) => {
                    AnthropicProvider::with_base_url(config.api_key.clone(), &config.model, url)
                }
                None => AnthropicProvider::new(config.api_key.clone(), &config.model),
            };
            tracing::info!("Using Anthropic (model: {})", config.model);
            Arc::new(provider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn creates_anthropic_provider_with_override() {
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from("sk-ant-test"),
            model: "claude-3-5-haiku-latest".to_string(),
            base_url: Some("http://127.0.0.1:8089".to_string()),
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "claude-3-5-haiku-latest");
    }
}
