//! Error types for the permit-desk classification service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Classification errors.
///
/// The classifier never invents a fallback result: a failed or malformed
/// model response surfaces here with the raw text attached so the caller
/// can decide between retry and manual escalation.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classification call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparsable classification response: {reason}")]
    UnparsableResponse { reason: String, raw: String },

    #[error("Classification response has invalid {field}: '{value}'")]
    SchemaViolation {
        field: &'static str,
        value: String,
        raw: String,
    },

    /// The model returned an intent outside the closed enumeration.
    /// This is a contract violation (usually a prompt regression), not a
    /// low-confidence result, so it is never coerced to `unclear`.
    #[error("Intent '{value}' is outside the closed intent enumeration")]
    InvalidIntent { value: String, raw: String },
}

impl ClassifyError {
    /// The raw model output that produced this error, when there was one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ClassifyError::Llm(_) => None,
            ClassifyError::UnparsableResponse { raw, .. }
            | ClassifyError::SchemaViolation { raw, .. }
            | ClassifyError::InvalidIntent { raw, .. } => Some(raw),
        }
    }
}

/// Desk (ticketing platform) API errors.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("OAuth token refresh failed: {reason}")]
    TokenRefresh { reason: String },

    #[error("Desk {call} request failed: {reason}")]
    RequestFailed { call: &'static str, reason: String },

    #[error("Desk {call} returned HTTP {status}: {body}")]
    ApiStatus {
        call: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response from desk {call}: {reason}")]
    InvalidResponse { call: &'static str, reason: String },

    #[error("Webhook payload invalid: {0}")]
    InvalidWebhook(String),
}

/// Correction-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Analytics log errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Desk API failed: {0}")]
    Desk(#[from] DeskError),

    #[error("Correction store failed: {0}")]
    Store(#[from] StoreError),
}
