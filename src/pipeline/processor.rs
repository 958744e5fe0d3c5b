//! Ticket processor: fetch, classify, route, tag, log.
//!
//! One instance is shared by every webhook task. A tagging failure does
//! not fail the run: the classification already happened, and the event
//! log must record it either way (with `tagging_success = false`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::analytics::{AnalyticsLogger, ClassificationEvent};
use crate::classify::{strip_html, Classification, Classifier};
use crate::desk::{DeskClient, WebhookEvent};
use crate::error::PipelineError;
use crate::llm::retry::{with_retry, RetryPolicy};
use crate::routing::{route, RoutingQueue};
use crate::store::{CorrectionRecord, CorrectionStore};
use crate::tagger::TicketTagger;

/// Custom field a CSR fills in to flag (or confirm) a classification.
const CORRECTED_INTENT_FIELD: &str = "cf_agent_corrected_intent";

/// Outcome of one full pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessedTicket {
    pub ticket_id: String,
    pub classification: Classification,
    pub queue: RoutingQueue,
    pub tagging_success: bool,
    pub processing_time: Duration,
}

/// Runs tickets through the classification pipeline.
pub struct TicketProcessor {
    desk: Arc<DeskClient>,
    classifier: Arc<dyn Classifier>,
    tagger: TicketTagger,
    analytics: Arc<AnalyticsLogger>,
    corrections: Arc<CorrectionStore>,
    retry: RetryPolicy,
}

impl TicketProcessor {
    pub fn new(
        desk: Arc<DeskClient>,
        classifier: Arc<dyn Classifier>,
        analytics: Arc<AnalyticsLogger>,
        corrections: Arc<CorrectionStore>,
    ) -> Self {
        Self {
            tagger: TicketTagger::new(desk.clone()),
            desk,
            classifier,
            analytics,
            corrections,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the classification retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process a freshly created ticket end to end.
    ///
    /// Every exit path writes a classification event; the analytics log is
    /// the ground truth for what the pipeline did, failures included.
    pub async fn process_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<ProcessedTicket, PipelineError> {
        let started = Instant::now();
        info!(ticket_id, "Starting ticket pipeline");

        // Step 1: fetch. The webhook payload is too thin to classify from.
        let ticket = match self.desk.get_ticket(ticket_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                self.analytics.log_classification(&ClassificationEvent::failure(
                    ticket_id,
                    &format!("Ticket fetch failed: {e}"),
                    started.elapsed(),
                ));
                return Err(e.into());
            }
        };
        info!(
            ticket_id,
            from = %ticket.email,
            subject = %ticket.subject,
            "Fetched ticket"
        );

        // Step 2: classify. Descriptions arrive as HTML.
        let body = strip_html(&ticket.description);
        let classification = match with_retry(self.retry, || {
            self.classifier
                .classify(&ticket.subject, &body, Some(ticket_id))
        })
        .await
        {
            Ok(classification) => classification,
            Err(e) => {
                self.analytics.log_classification(&ClassificationEvent::failure(
                    ticket_id,
                    &format!("Classification failed: {e}"),
                    started.elapsed(),
                ));
                return Err(e.into());
            }
        };
        info!(
            ticket_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            urgency = %classification.urgency,
            review = classification.requires_human_review,
            "Email classified"
        );

        // Step 3: route.
        let queue = route(&classification);
        debug!(ticket_id, queue = queue.as_str(), "Routing decided");

        // Step 4: tag. Non-fatal; a CSR still sees the queue assignment in
        // the analytics even if the desk write bounced.
        let tagging_success = match self.tagger.apply(ticket_id, &classification, queue).await {
            Ok(()) => true,
            Err(e) => {
                warn!(ticket_id, error = %e, "Tagging failed");
                false
            }
        };

        // Step 5: log.
        let processing_time = started.elapsed();
        self.analytics.log_classification(&ClassificationEvent::success(
            ticket_id,
            &classification,
            queue,
            processing_time,
            tagging_success,
        ));
        info!(
            ticket_id,
            queue = queue.as_str(),
            tagging_success,
            elapsed_ms = processing_time.as_millis() as u64,
            "Pipeline complete"
        );

        Ok(ProcessedTicket {
            ticket_id: ticket_id.to_string(),
            classification,
            queue,
            tagging_success,
            processing_time,
        })
    }

    /// Record a CSR correction from a ticket-updated event.
    ///
    /// Returns `Ok(None)` when the update carries no corrected intent,
    /// which is every update that is not a CSR correction. The corrected
    /// value is stored verbatim: CSRs may enter intents the classifier
    /// does not know about yet (`tow_issue`, `password_reset`).
    pub async fn process_correction(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<CorrectionRecord>, PipelineError> {
        let ticket = &event.ticket;

        let Some(corrected) = ticket
            .custom_field(CORRECTED_INTENT_FIELD)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            debug!(
                ticket_id = %event.ticket_id,
                "Update carries no corrected intent, nothing to record"
            );
            return Ok(None);
        };

        let original = ticket
            .custom_field("cf_ai_intent")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");

        // The desk stores numeric custom fields as strings ("85").
        let confidence = ticket
            .custom_field("cf_ai_confidence")
            .and_then(|s| s.trim().parse::<i64>().ok());

        let record = CorrectionRecord::new(
            event.ticket_id.clone(),
            original,
            corrected,
            confidence,
            ticket.department_id.clone(),
        );
        info!(
            ticket_id = %event.ticket_id,
            original = %record.original_intent,
            corrected = %record.corrected_intent,
            misclassification = record.is_misclassification,
            "CSR correction received"
        );

        self.corrections.record(&record).await?;
        Ok(Some(record))
    }
}
