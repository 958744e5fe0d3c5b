//! reqwest-based client for the desk ticket API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{error, warn};

use crate::analytics::{AnalyticsLogger, ApiUsageEvent};
use crate::config::DeskSettings;
use crate::desk::auth::DeskAuth;
use crate::desk::types::Ticket;
use crate::error::DeskError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DeskClient {
    client: Client,
    auth: Arc<DeskAuth>,
    base_url: String,
    org_id: String,
    analytics: Option<Arc<AnalyticsLogger>>,
}

impl DeskClient {
    pub fn new(settings: &DeskSettings, auth: Arc<DeskAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            org_id: settings.org_id.clone(),
            analytics: None,
        }
    }

    /// Report every call as an API-usage event to this logger.
    pub fn with_analytics(mut self, analytics: Arc<AnalyticsLogger>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Fetch full ticket details.
    pub async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket, DeskError> {
        let call = "get_ticket";
        let result = self
            .send(call, Method::GET, &format!("/tickets/{ticket_id}"), None)
            .await
            .and_then(|value| {
                serde_json::from_value(value).map_err(|e| DeskError::InvalidResponse {
                    call,
                    reason: e.to_string(),
                })
            });
        self.log_call(call, Some(ticket_id), result.as_ref().err());
        result
    }

    /// PATCH arbitrary fields onto a ticket.
    pub async fn update_ticket(&self, ticket_id: &str, data: &Value) -> Result<Value, DeskError> {
        let call = "update_ticket";
        let result = self
            .send(
                call,
                Method::PATCH,
                &format!("/tickets/{ticket_id}"),
                Some(data),
            )
            .await;
        self.log_call(call, Some(ticket_id), result.as_ref().err());
        result
    }

    /// Add a comment to a ticket. Private unless `is_public`.
    pub async fn add_comment(
        &self,
        ticket_id: &str,
        content: &str,
        is_public: bool,
    ) -> Result<Value, DeskError> {
        let call = "add_comment";
        let body = serde_json::json!({"content": content, "isPublic": is_public});
        let result = self
            .send(
                call,
                Method::POST,
                &format!("/tickets/{ticket_id}/comments"),
                Some(&body),
            )
            .await;
        self.log_call(call, Some(ticket_id), result.as_ref().err());
        result
    }

    /// All departments. The health check uses this as its connectivity probe.
    pub async fn get_departments(&self) -> Result<Vec<Value>, DeskError> {
        let call = "get_departments";
        let result = self
            .send(call, Method::GET, "/departments", None)
            .await
            .map(|value| {
                value
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            });
        self.log_call(call, None, result.as_ref().err());
        result
    }

    async fn send(
        &self,
        call: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, DeskError> {
        let mut response = self.dispatch(call, method.clone(), path, body).await?;

        // A 401 means the cached token went stale. Refresh once and retry.
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(call, "Desk returned 401, refreshing access token");
            self.auth.invalidate().await;
            response = self.dispatch(call, method, path, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            error!(call, status = status.as_u16(), "Desk API error: {body_text}");
            return Err(DeskError::ApiStatus {
                call,
                status: status.as_u16(),
                body: body_text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| DeskError::InvalidResponse {
                call,
                reason: e.to_string(),
            })
    }

    async fn dispatch(
        &self,
        call: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, DeskError> {
        let token = self.auth.access_token().await?;
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .header("orgId", &self.org_id)
            .header("Authorization", format!("Zoho-oauthtoken {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| DeskError::RequestFailed {
            call,
            reason: e.to_string(),
        })
    }

    /// Usage logging must never fail a call; the logger itself swallows IO
    /// errors, so this only skips when no logger is attached.
    fn log_call(&self, call_type: &str, ticket_id: Option<&str>, error: Option<&DeskError>) {
        let Some(analytics) = &self.analytics else {
            return;
        };
        let event = match error {
            None => ApiUsageEvent::desk(call_type, ticket_id),
            Some(e) => ApiUsageEvent::desk_failure(call_type, ticket_id, &e.to_string()),
        };
        analytics.log_api_usage(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn settings(base_url: &str) -> DeskSettings {
        DeskSettings {
            org_id: "org-1".to_string(),
            data_center: "com".to_string(),
            client_id: "client".to_string(),
            client_secret: SecretString::from("secret"),
            refresh_token: SecretString::from("refresh"),
            base_url: base_url.to_string(),
            accounts_url: "https://accounts.zoho.com".to_string(),
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let settings = settings("https://desk.zoho.com/api/v1/");
        let auth = Arc::new(DeskAuth::new(&settings));
        let client = DeskClient::new(&settings, auth);
        assert_eq!(client.base_url, "https://desk.zoho.com/api/v1");
    }

    #[test]
    fn log_call_without_logger_is_a_no_op() {
        let settings = settings("https://desk.zoho.com/api/v1");
        let auth = Arc::new(DeskAuth::new(&settings));
        let client = DeskClient::new(&settings, auth);
        client.log_call("get_ticket", Some("1"), None);
    }
}
