//! Ticket model and webhook envelope parsing.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DeskError;

/// A support ticket as returned by the desk API.
///
/// Only the fields the pipeline reads are modeled. `cf` holds the
/// platform's custom fields, whose values arrive as strings or nulls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ticket {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    /// HTML body of the originating email.
    #[serde(default)]
    pub description: String,
    /// Sender address.
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "departmentId")]
    pub department_id: Option<String>,
    #[serde(default)]
    pub cf: serde_json::Map<String, Value>,
}

impl Ticket {
    /// A custom field's value, when present and non-null.
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.cf.get(name).and_then(Value::as_str)
    }
}

/// A single webhook delivery, unwrapped from the platform envelope.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub ticket_id: String,
    pub event_type: String,
    pub ticket: Ticket,
}

/// Unwrap the platform's webhook envelope.
///
/// Events arrive as a JSON array with the ticket data nested under
/// `payload`; some webhook configurations deliver a bare object instead.
/// The ticket id lives at `payload.id`, with `ticketId` fallbacks at both
/// nesting levels.
pub fn parse_webhook_envelope(body: &Value) -> Result<WebhookEvent, DeskError> {
    let event = match body {
        Value::Array(events) => events
            .first()
            .ok_or_else(|| DeskError::InvalidWebhook("empty event array".to_string()))?,
        other => other,
    };

    let ticket_payload = event.get("payload").unwrap_or(event);

    let ticket_id = ticket_payload
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| ticket_payload.get("ticketId").and_then(Value::as_str))
        .or_else(|| event.get("ticketId").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DeskError::InvalidWebhook("missing ticket id".to_string()))?
        .to_string();

    let event_type = event
        .get("eventType")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let mut ticket: Ticket = serde_json::from_value(ticket_payload.clone())
        .map_err(|e| DeskError::InvalidWebhook(format!("malformed ticket payload: {e}")))?;
    ticket.id = ticket_id.clone();

    Ok(WebhookEvent {
        ticket_id,
        event_type,
        ticket,
    })
}
