//! Desk platform integration: OAuth session, API client, webhook parsing.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::DeskAuth;
pub use client::DeskClient;
pub use types::{Ticket, WebhookEvent, parse_webhook_envelope};
