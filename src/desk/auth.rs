//! OAuth session for the desk platform.
//!
//! Access tokens come from the refresh-token grant and stay cached until a
//! caller invalidates them after an auth failure.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DeskSettings;
use crate::error::DeskError;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds the OAuth credentials and the cached access token.
pub struct DeskAuth {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    cached: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl DeskAuth {
    pub fn new(settings: &DeskSettings) -> Self {
        Self {
            client: Client::new(),
            token_url: format!(
                "{}/oauth/v2/token",
                settings.accounts_url.trim_end_matches('/')
            ),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            refresh_token: settings.refresh_token.clone(),
            cached: Mutex::new(None),
        }
    }

    /// The current access token, refreshing it when none is cached.
    ///
    /// The lock is held across the refresh so concurrent callers wait for
    /// one refresh instead of racing their own.
    pub async fn access_token(&self) -> Result<String, DeskError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = self
            .client
            .post(&self.token_url)
            .timeout(TOKEN_TIMEOUT)
            .form(&[
                ("refresh_token", self.refresh_token.expose_secret()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| DeskError::TokenRefresh {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeskError::TokenRefresh {
                reason: format!("HTTP {}: {body}", status.as_u16()),
            });
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| DeskError::TokenRefresh {
                reason: format!("malformed token response: {e}"),
            })?;

        debug!("Desk access token refreshed");
        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Drop the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DeskSettings {
        DeskSettings {
            org_id: "org-1".to_string(),
            data_center: "com".to_string(),
            client_id: "client".to_string(),
            client_secret: SecretString::from("secret"),
            refresh_token: SecretString::from("refresh"),
            base_url: "https://desk.zoho.com/api/v1".to_string(),
            accounts_url: "https://accounts.zoho.com/".to_string(),
        }
    }

    #[test]
    fn token_url_joins_without_double_slash() {
        let auth = DeskAuth::new(&settings());
        assert_eq!(auth.token_url, "https://accounts.zoho.com/oauth/v2/token");
    }

    #[tokio::test]
    async fn invalidate_clears_the_cache() {
        let auth = DeskAuth::new(&settings());
        *auth.cached.lock().await = Some("stale".to_string());

        auth.invalidate().await;
        assert!(auth.cached.lock().await.is_none());
    }
}
