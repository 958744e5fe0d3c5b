//! Configuration loaded from environment variables.

use secrecy::SecretString;

use crate::classify::HUMAN_REVIEW_CONFIDENCE_THRESHOLD;
use crate::error::ConfigError;

/// Desk (ticketing platform) connection settings.
#[derive(Debug, Clone)]
pub struct DeskSettings {
    /// Organization id sent in the `orgId` header on every call.
    pub org_id: String,
    /// Data center suffix ("com", "eu", "in", ...).
    pub data_center: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    /// Desk API base. Derived from the data center unless overridden.
    pub base_url: String,
    /// OAuth accounts base. Derived from the data center unless overridden.
    pub accounts_url: String,
}

impl DeskSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let org_id = require_env("DESK_ORG_ID")?;
        let data_center =
            std::env::var("DESK_DATA_CENTER").unwrap_or_else(|_| "com".to_string());
        let client_id = require_env("DESK_CLIENT_ID")?;
        let client_secret = SecretString::from(require_env("DESK_CLIENT_SECRET")?);
        let refresh_token = SecretString::from(require_env("DESK_REFRESH_TOKEN")?);

        let base_url = std::env::var("DESK_BASE_URL")
            .unwrap_or_else(|_| format!("https://desk.zoho.{data_center}/api/v1"));
        let accounts_url = std::env::var("DESK_ACCOUNTS_URL")
            .unwrap_or_else(|_| format!("https://accounts.zoho.{data_center}"));

        Ok(Self {
            org_id,
            data_center,
            client_id,
            client_secret,
            refresh_token,
            base_url,
            accounts_url,
        })
    }
}

/// Which LLM vendor backs the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Anthropic,
}

impl AiProvider {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "openai" => Ok(AiProvider::OpenAi),
            "anthropic" => Ok(AiProvider::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "AI_PROVIDER".to_string(),
                message: format!("'{other}' is not one of: openai, anthropic"),
            }),
        }
    }
}

/// Classifier model settings.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub provider: AiProvider,
    pub model: String,
    pub api_key: SecretString,
    /// Override for the provider API base (used by tests).
    pub base_url: Option<String>,
}

impl AiSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = AiProvider::parse(
            &std::env::var("AI_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
        )?;
        let model =
            std::env::var("AI_MODEL").unwrap_or_else(|_| default_model(provider).to_string());

        let key_var = match provider {
            AiProvider::OpenAi => "OPENAI_API_KEY",
            AiProvider::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key = SecretString::from(require_env(key_var)?);
        let base_url = std::env::var("AI_BASE_URL").ok();

        Ok(Self {
            provider,
            model,
            api_key,
            base_url,
        })
    }
}

fn default_model(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::OpenAi => "gpt-4o-mini",
        AiProvider::Anthropic => "claude-3-5-haiku-latest",
    }
}

/// Full application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub desk: DeskSettings,
    pub ai: AiSettings,
    pub host: String,
    pub port: u16,
    /// Directory for JSONL analytics logs and the rotating service log.
    pub log_dir: String,
    /// Path of the corrections database file.
    pub corrections_db: String,
    /// Confidence below which a ticket is flagged for human review.
    pub human_review_threshold: f64,
    /// Maximum concurrent classification pipelines.
    pub pipeline_concurrency: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("APP_PORT", 8080_u16)?;
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let corrections_db = std::env::var("CORRECTIONS_DB")
            .unwrap_or_else(|_| "data/corrections.db".to_string());
        let human_review_threshold = parse_env(
            "HUMAN_REVIEW_CONFIDENCE_THRESHOLD",
            HUMAN_REVIEW_CONFIDENCE_THRESHOLD,
        )?;
        let pipeline_concurrency = parse_env("PIPELINE_CONCURRENCY", 3_usize)?;

        Ok(Self {
            desk: DeskSettings::from_env()?,
            ai: AiSettings::from_env()?,
            host,
            port,
            log_dir,
            corrections_db,
            human_review_threshold,
            pipeline_concurrency,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
