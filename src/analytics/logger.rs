//! JSONL event logging for dashboard analytics.
//!
//! Two append-only logs: one classification event per processed ticket and
//! one row per outbound API call. Logging must never fail the operation it
//! observes, so every public method swallows its own errors after tracing
//! them.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::analytics::round_to;
use crate::classify::Classification;
use crate::error::AnalyticsError;
use crate::routing::RoutingQueue;

/// Timestamps sort lexicographically, which the time-window filter relies on.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ── Event shapes ────────────────────────────────────────────────────

/// One processed ticket. A failed classification still gets a row, with the
/// classification columns null and `error` set, so error rates stay honest.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationEvent {
    pub timestamp: String,
    pub ticket_id: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub complexity: Option<String>,
    pub urgency: Option<String>,
    pub language: Option<String>,
    pub requires_refund: bool,
    pub requires_human_review: bool,
    pub routing_queue: Option<String>,
    pub entities: serde_json::Value,
    pub processing_time_seconds: Option<f64>,
    pub tagging_success: bool,
    pub error: Option<String>,
}

impl ClassificationEvent {
    pub fn success(
        ticket_id: &str,
        classification: &Classification,
        queue: RoutingQueue,
        processing_time: Duration,
        tagging_success: bool,
    ) -> Self {
        let entities = &classification.key_entities;
        Self {
            timestamp: now_timestamp(),
            ticket_id: ticket_id.to_string(),
            intent: Some(classification.intent.to_string()),
            confidence: Some(classification.confidence),
            complexity: Some(classification.complexity.to_string()),
            urgency: Some(classification.urgency.to_string()),
            language: Some(classification.language.to_string()),
            requires_refund: classification.requires_refund,
            requires_human_review: classification.requires_human_review,
            routing_queue: Some(queue.as_str().to_string()),
            entities: json!({
                "license_plate": entities.license_plate,
                "move_out_date": entities.move_out_date,
                "property_name": entities.property_name,
                "amount": entities.amount,
            }),
            processing_time_seconds: Some(round_to(processing_time.as_secs_f64(), 2)),
            tagging_success,
            error: None,
        }
    }

    pub fn failure(ticket_id: &str, error: &str, processing_time: Duration) -> Self {
        Self {
            timestamp: now_timestamp(),
            ticket_id: ticket_id.to_string(),
            intent: None,
            confidence: None,
            complexity: None,
            urgency: None,
            language: None,
            requires_refund: false,
            requires_human_review: false,
            routing_queue: None,
            entities: json!({}),
            processing_time_seconds: Some(round_to(processing_time.as_secs_f64(), 2)),
            tagging_success: false,
            error: Some(error.to_string()),
        }
    }
}

/// One outbound API call, LLM or help desk.
#[derive(Debug, Clone, Serialize)]
pub struct ApiUsageEvent {
    pub timestamp: String,
    pub provider: String,
    pub call_type: String,
    pub ticket_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub estimated_cost_usd: Option<f64>,
}

impl ApiUsageEvent {
    /// Successful help-desk call. Desk calls have no token accounting.
    pub fn desk(call_type: &str, ticket_id: Option<&str>) -> Self {
        Self {
            timestamp: now_timestamp(),
            provider: "desk".to_string(),
            call_type: call_type.to_string(),
            ticket_id: ticket_id.map(str::to_string),
            success: true,
            error: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            estimated_cost_usd: None,
        }
    }

    pub fn desk_failure(call_type: &str, ticket_id: Option<&str>, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::desk(call_type, ticket_id)
        }
    }

    /// Successful classification call with token usage and estimated cost.
    /// Ad-hoc classifications (no originating ticket) log a null ticket id.
    pub fn classification(
        provider: &str,
        ticket_id: Option<&str>,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost: Decimal,
    ) -> Self {
        Self {
            timestamp: now_timestamp(),
            provider: provider.to_string(),
            call_type: "classification".to_string(),
            ticket_id: ticket_id.map(str::to_string),
            success: true,
            error: None,
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(prompt_tokens + completion_tokens),
            estimated_cost_usd: cost.to_f64(),
        }
    }

    pub fn classification_failure(provider: &str, ticket_id: Option<&str>, error: &str) -> Self {
        Self {
            timestamp: now_timestamp(),
            provider: provider.to_string(),
            call_type: "classification".to_string(),
            ticket_id: ticket_id.map(str::to_string),
            success: false,
            error: Some(error.to_string()),
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            estimated_cost_usd: None,
        }
    }
}

// ── Logger ──────────────────────────────────────────────────────────

/// Append-only JSONL sink. Cheap to share behind an `Arc`.
pub struct AnalyticsLogger {
    classifications_path: PathBuf,
    api_usage_path: PathBuf,
    write_lock: Mutex<()>,
}

impl AnalyticsLogger {
    /// Logger rooted at a log directory. Files are created on first write.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        Self {
            classifications_path: log_dir.join("classifications.jsonl"),
            api_usage_path: log_dir.join("api_usage.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_classification(&self, event: &ClassificationEvent) {
        match self.append(&self.classifications_path, event) {
            Ok(()) => debug!(ticket_id = %event.ticket_id, "Classification event logged"),
            Err(e) => error!(
                ticket_id = %event.ticket_id,
                error = %e,
                "Failed to log classification event"
            ),
        }
    }

    pub fn log_api_usage(&self, event: &ApiUsageEvent) {
        if let Err(e) = self.append(&self.api_usage_path, event) {
            error!(
                provider = %event.provider,
                call_type = %event.call_type,
                error = %e,
                "Failed to log API usage event"
            );
        }
    }

    fn append<T: Serialize>(&self, path: &Path, event: &T) -> Result<(), AnalyticsError> {
        let line = serde_json::to_string(event)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
