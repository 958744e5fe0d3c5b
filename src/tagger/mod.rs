//! Writes classification results back onto desk tickets.
//!
//! Results land in two places: `cf_*` custom fields the CSR views and
//! widgets filter on, and a private comment that survives even when the
//! custom fields are misconfigured on the desk side.

pub mod dates;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::classify::Classification;
use crate::desk::DeskClient;
use crate::error::DeskError;
use crate::routing::RoutingQueue;

pub use dates::normalize_move_out_date;

pub struct TicketTagger {
    desk: Arc<DeskClient>,
}

impl TicketTagger {
    pub fn new(desk: Arc<DeskClient>) -> Self {
        Self { desk }
    }

    /// Apply classification results to a ticket.
    ///
    /// Updates the custom fields, then leaves a private summary comment.
    /// Both writes must succeed for the ticket to count as tagged.
    pub async fn apply(
        &self,
        ticket_id: &str,
        classification: &Classification,
        queue: RoutingQueue,
    ) -> Result<(), DeskError> {
        let fields = build_custom_fields(classification, queue);
        debug!(
            ticket_id,
            field_count = fields.as_object().map(|o| o.len()).unwrap_or(0),
            "Updating custom fields"
        );
        self.desk
            .update_ticket(ticket_id, &json!({ "customFields": fields }))
            .await?;

        let comment = build_classification_comment(classification, queue);
        self.desk.add_comment(ticket_id, &comment, false).await?;
        Ok(())
    }
}

/// Confidence as the integer percent the desk number field expects.
fn confidence_percent(confidence: f64) -> i64 {
    (confidence * 100.0) as i64
}

fn build_custom_fields(classification: &Classification, queue: RoutingQueue) -> Value {
    let mut fields = serde_json::Map::new();
    fields.insert(
        "cf_ai_intent".to_string(),
        json!(classification.intent.to_string()),
    );
    fields.insert(
        "cf_ai_complexity".to_string(),
        json!(classification.complexity.to_string()),
    );
    fields.insert(
        "cf_ai_language".to_string(),
        json!(classification.language.to_string()),
    );
    fields.insert(
        "cf_ai_urgency".to_string(),
        json!(classification.urgency.to_string()),
    );
    fields.insert(
        "cf_ai_confidence".to_string(),
        json!(confidence_percent(classification.confidence)),
    );
    fields.insert(
        "cf_requires_refund".to_string(),
        json!(classification.requires_refund),
    );
    fields.insert(
        "cf_requires_human_review".to_string(),
        json!(classification.requires_human_review),
    );
    if let Some(plate) = &classification.key_entities.license_plate {
        fields.insert("cf_license_plate".to_string(), json!(plate));
    }
    // The desk date field rejects free-form text, so an unparseable date is
    // left off entirely. The raw text still shows in the comment.
    if let Some(date) = classification
        .key_entities
        .move_out_date
        .as_deref()
        .and_then(normalize_move_out_date)
    {
        fields.insert("cf_move_out_date".to_string(), json!(date));
    }
    fields.insert("cf_routing_queue".to_string(), json!(queue.as_str()));
    Value::Object(fields)
}

fn build_classification_comment(classification: &Classification, queue: RoutingQueue) -> String {
    let mut lines = vec![
        "🤖 AI Classification Results".to_string(),
        format!("Timestamp: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
        String::new(),
        format!("Intent: {}", classification.intent),
        format!("Complexity: {}", classification.complexity),
        format!("Language: {}", classification.language),
        format!("Urgency: {}", classification.urgency),
        format!(
            "Confidence: {}%",
            confidence_percent(classification.confidence)
        ),
        String::new(),
        format!(
            "Requires Refund: {}",
            yes_no(classification.requires_refund)
        ),
        format!(
            "Requires Human Review: {}",
            yes_no(classification.requires_human_review)
        ),
        String::new(),
        format!("Recommended Queue: {}", queue.as_str()),
        format!("Routing Reason: {}", queue.reason()),
    ];

    let entities = &classification.key_entities;
    if !entities.is_empty() {
        lines.push(String::new());
        lines.push("Extracted Information:".to_string());
        if let Some(plate) = &entities.license_plate {
            lines.push(format!("  • License Plate: {plate}"));
        }
        if let Some(date) = &entities.move_out_date {
            lines.push(format!("  • Move-Out Date: {date}"));
        }
        if let Some(property) = &entities.property_name {
            lines.push(format!("  • Property: {property}"));
        }
        if let Some(amount) = &entities.amount {
            lines.push(format!("  • Amount: ${amount}"));
        }
    }

    if !classification.notes.is_empty() {
        lines.push(String::new());
        lines.push(format!("Notes: {}", classification.notes));
    }

    lines.join("\n")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}
