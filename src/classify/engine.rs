//! Classification engine: raw email text in, `Classification` out.
//!
//! The decision policy lives in the prompt (see `prompt.rs`); this module
//! owns the mechanical half: calling the model, digging the JSON out of
//! whatever wrapping it arrives in, and validating the result against the
//! closed schema. An out-of-enum intent is a contract violation and fails
//! the classification; quietly coercing it to `unclear` would hide prompt
//! regressions.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::analytics::{AnalyticsLogger, ApiUsageEvent};
use crate::classify::model::{
    Classification, Complexity, Intent, KeyEntities, Language, ResponseType, Urgency,
    HUMAN_REVIEW_CONFIDENCE_THRESHOLD,
};
use crate::classify::prompt::{build_classify_system_prompt, build_classify_user_prompt};
use crate::error::{ClassifyError, LlmError};
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// Max tokens for the classification call. The response is a small fixed
/// JSON object; anything that does not fit here is malformed anyway.
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Temperature for classification. Low but not zero so borderline emails
/// still get calibrated confidence instead of mode collapse.
const CLASSIFY_TEMPERATURE: f32 = 0.3;

// ── Classifier trait ────────────────────────────────────────────────

/// Anything that can classify a support email.
///
/// The production implementation delegates to an LLM; tests substitute
/// deterministic stubs so routing and pipeline logic can be exercised
/// without a network. `ticket_id` is attribution only (cost-per-ticket
/// analytics); ad-hoc callers pass `None`.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        subject: &str,
        body: &str,
        ticket_id: Option<&str>,
    ) -> Result<Classification, ClassifyError>;
}

// ── LLM-backed implementation ───────────────────────────────────────

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    review_threshold: f64,
    analytics: Option<Arc<AnalyticsLogger>>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            review_threshold: HUMAN_REVIEW_CONFIDENCE_THRESHOLD,
            analytics: None,
        }
    }

    /// Override the human-review confidence threshold (config-driven).
    pub fn with_review_threshold(mut self, threshold: f64) -> Self {
        self.review_threshold = threshold;
        self
    }

    /// Record token usage and cost for every model call.
    pub fn with_analytics(mut self, analytics: Arc<AnalyticsLogger>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    fn log_usage(&self, ticket_id: Option<&str>, response: &CompletionResponse) {
        let Some(analytics) = &self.analytics else {
            return;
        };
        let (input_rate, output_rate) = self.llm.cost_per_token();
        let cost = input_rate * Decimal::from(response.input_tokens)
            + output_rate * Decimal::from(response.output_tokens);
        analytics.log_api_usage(&ApiUsageEvent::classification(
            self.llm.provider_name(),
            ticket_id,
            response.input_tokens,
            response.output_tokens,
            cost,
        ));
    }

    fn log_usage_failure(&self, ticket_id: Option<&str>, error: &LlmError) {
        let Some(analytics) = &self.analytics else {
            return;
        };
        analytics.log_api_usage(&ApiUsageEvent::classification_failure(
            self.llm.provider_name(),
            ticket_id,
            &error.to_string(),
        ));
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        subject: &str,
        body: &str,
        ticket_id: Option<&str>,
    ) -> Result<Classification, ClassifyError> {
        // Nothing to send to a model. Resolve locally instead of burning a
        // call on input that can only come back `unclear`.
        if subject.trim().is_empty() && body.trim().is_empty() {
            debug!("Empty subject and body, skipping model call");
            return Ok(Classification::no_signal());
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(subject, body)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_json_response();

        debug!(
            model = self.llm.model_name(),
            subject_chars = subject.len(),
            body_chars = body.len(),
            "Sending classification request"
        );

        // The usage event tracks the API call itself, so it is written even
        // when the response later fails validation.
        let response = match self.llm.complete(request).await {
            Ok(response) => {
                self.log_usage(ticket_id, &response);
                response
            }
            Err(e) => {
                self.log_usage_failure(ticket_id, &e);
                return Err(e.into());
            }
        };

        if response.finish_reason == FinishReason::Length {
            return Err(ClassifyError::UnparsableResponse {
                reason: "response truncated at max tokens".to_string(),
                raw: response.content,
            });
        }

        parse_classify_response(&response.content, self.review_threshold).inspect_err(|e| {
            warn!(
                raw_response = %response.content,
                error = %e,
                "Classification response failed validation"
            );
        })
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// Wire shape of the model's reply. Only `intent` and `confidence` are
/// hard requirements; everything else degrades to a conservative default
/// when the model omits it.
#[derive(Debug, serde::Deserialize)]
struct RawClassification {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    complexity: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    key_entities: KeyEntities,
    #[serde(default)]
    requires_refund: bool,
    #[serde(default)]
    requires_human_review: bool,
    #[serde(default)]
    suggested_response_type: Option<String>,
    #[serde(default)]
    notes: String,
}

/// Parse and validate a model response into a finalized `Classification`.
fn parse_classify_response(
    raw: &str,
    review_threshold: f64,
) -> Result<Classification, ClassifyError> {
    // The model may wrap the object in markdown or prose.
    let json_str = extract_json_object(raw);
    let parsed: RawClassification =
        serde_json::from_str(&json_str).map_err(|e| ClassifyError::UnparsableResponse {
            reason: format!("JSON parse error: {e}"),
            raw: raw.to_string(),
        })?;

    let intent_value = parsed
        .intent
        .ok_or_else(|| ClassifyError::SchemaViolation {
            field: "intent",
            value: "<missing>".to_string(),
            raw: raw.to_string(),
        })?;
    let intent = Intent::from_str(&intent_value).map_err(|value| {
        ClassifyError::InvalidIntent {
            value,
            raw: raw.to_string(),
        }
    })?;

    let confidence = parsed
        .confidence
        .ok_or_else(|| ClassifyError::SchemaViolation {
            field: "confidence",
            value: "<missing>".to_string(),
            raw: raw.to_string(),
        })?;

    let complexity =
        parse_optional_field(parsed.complexity, Complexity::Moderate, "complexity", raw)?;
    let language = parse_optional_field(parsed.language, Language::Other, "language", raw)?;
    let urgency = parse_optional_field(parsed.urgency, Urgency::Medium, "urgency", raw)?;
    let suggested_response_type = parse_optional_field(
        parsed.suggested_response_type,
        ResponseType::Manual,
        "suggested_response_type",
        raw,
    )?;

    let classification = Classification {
        intent,
        complexity,
        language,
        urgency,
        confidence,
        key_entities: clean_entities(parsed.key_entities),
        requires_refund: parsed.requires_refund,
        requires_human_review: parsed.requires_human_review,
        suggested_response_type,
        notes: parsed.notes,
    };

    Ok(classification.finalize(review_threshold))
}

/// Absent field → default; present-but-invalid field → schema violation.
fn parse_optional_field<T: FromStr<Err = String>>(
    value: Option<String>,
    default: T,
    field: &'static str,
    raw: &str,
) -> Result<T, ClassifyError> {
    match value {
        None => Ok(default),
        Some(s) => T::from_str(&s).map_err(|value| ClassifyError::SchemaViolation {
            field,
            value,
            raw: raw.to_string(),
        }),
    }
}

/// Drop empty-string entity values so downstream sees real absence.
fn clean_entities(entities: KeyEntities) -> KeyEntities {
    let clean = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    KeyEntities {
        license_plate: clean(entities.license_plate),
        move_out_date: clean(entities.move_out_date),
        property_name: clean(entities.property_name),
        amount: clean(entities.amount),
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock LLM returning a fixed response body.
    struct MockLlm {
        response: String,
        finish_reason: FinishReason,
        calls: AtomicUsize,
    }

    impl MockLlm {
        fn returning(response: &str) -> Self {
            Self {
                response: response.to_string(),
                finish_reason: FinishReason::Stop,
                calls: AtomicUsize::new(0),
            }
        }

        fn truncated(response: &str) -> Self {
            Self {
                finish_reason: FinishReason::Length,
                ..Self::returning(response)
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockLlm {
        fn provider_name(&self) -> &'static str {
            "mock"
        }

        fn model_name(&self) -> &str {
            "mock-classifier"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            // 1e-6 / 2e-6 USD per token, so 100 in + 50 out costs 0.0002.
            (Decimal::new(1, 6), Decimal::new(2, 6))
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 100,
                output_tokens: 50,
                finish_reason: self.finish_reason,
            })
        }
    }

    /// Mock LLM that always fails.
    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmProvider for FailingLlm {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "failing".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn full_response() -> &'static str {
        r#"{
            "intent": "refund_request",
            "complexity": "simple",
            "language": "english",
            "urgency": "medium",
            "confidence": 0.92,
            "key_entities": {
                "license_plate": "ABC-1234",
                "move_out_date": "March 1st",
                "property_name": null,
                "amount": "45.00"
            },
            "requires_refund": true,
            "requires_human_review": false,
            "suggested_response_type": "auto_draft",
            "notes": "Clear refund request with plate and amount."
        }"#
    }

    #[tokio::test]
    async fn classify_parses_complete_response() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(full_response())));
        let c = classifier
            .classify(
                "Refund request",
                "Please refund my $45, plate ABC-1234, moving March 1st",
                None,
            )
            .await
            .unwrap();

        assert_eq!(c.intent, Intent::RefundRequest);
        assert_eq!(c.complexity, Complexity::Simple);
        assert_eq!(c.language, Language::English);
        assert_eq!(c.urgency, Urgency::Medium);
        assert!((c.confidence - 0.92).abs() < 1e-9);
        assert_eq!(c.key_entities.license_plate.as_deref(), Some("ABC-1234"));
        assert_eq!(c.key_entities.amount.as_deref(), Some("45.00"));
        assert!(c.key_entities.property_name.is_none());
        assert!(c.requires_refund);
        assert!(!c.requires_human_review);
        assert_eq!(c.suggested_response_type, ResponseType::AutoDraft);
    }

    #[tokio::test]
    async fn empty_subject_and_body_skip_the_model() {
        let llm = Arc::new(MockLlm::returning(full_response()));
        let classifier = LlmClassifier::new(llm.clone());

        let c = classifier.classify("", "", None).await.unwrap();
        assert_eq!(c.intent, Intent::Unclear);
        assert!(c.confidence < 0.40);
        assert!(c.requires_human_review);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);

        // Whitespace-only counts as empty too.
        let c = classifier.classify("  ", "\n\t", None).await.unwrap();
        assert_eq!(c.intent, Intent::Unclear);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn subject_only_input_still_calls_the_model() {
        let llm = Arc::new(MockLlm::returning(
            r#"{"intent": "refund_request", "confidence": 0.55}"#,
        ));
        let classifier = LlmClassifier::new(llm.clone());

        let c = classifier.classify("Refund", "", None).await.unwrap();
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.intent, Intent::RefundRequest);
        assert!(c.confidence <= 0.55);
    }

    #[tokio::test]
    async fn markdown_wrapped_response_parses() {
        let wrapped = format!("Here is the classification:\n```json\n{}\n```", full_response());
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(&wrapped)));
        let c = classifier.classify("Refund", "body", None).await.unwrap();
        assert_eq!(c.intent, Intent::RefundRequest);
    }

    #[tokio::test]
    async fn out_of_enum_intent_is_rejected() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "tow_issue", "confidence": 0.9}"#,
        )));
        let err = classifier.classify("Tow", "My car was towed", None).await.unwrap_err();
        match err {
            ClassifyError::InvalidIntent { value, raw } => {
                assert_eq!(value, "tow_issue");
                assert!(raw.contains("tow_issue"));
            }
            other => panic!("Expected InvalidIntent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_intent_is_a_schema_violation() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"confidence": 0.9}"#,
        )));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        match err {
            ClassifyError::SchemaViolation { field, .. } => assert_eq!(field, "intent"),
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_confidence_is_a_schema_violation() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "unclear"}"#,
        )));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        match err {
            ClassifyError::SchemaViolation { field, .. } => assert_eq!(field, "confidence"),
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_complexity_is_a_schema_violation() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "unclear", "confidence": 0.5, "complexity": "impossible"}"#,
        )));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        match err {
            ClassifyError::SchemaViolation { field, value, .. } => {
                assert_eq!(field, "complexity");
                assert_eq!(value, "impossible");
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_response_is_unparsable_and_carries_raw() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            "I cannot classify this email.",
        )));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        match &err {
            ClassifyError::UnparsableResponse { raw, .. } => {
                assert!(raw.contains("cannot classify"));
            }
            other => panic!("Expected UnparsableResponse, got {:?}", other),
        }
        assert_eq!(err.raw_response(), Some("I cannot classify this email."));
    }

    #[tokio::test]
    async fn truncated_response_is_unparsable() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::truncated(
            r#"{"intent": "refund_request", "confi"#,
        )));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        match err {
            ClassifyError::UnparsableResponse { reason, .. } => {
                assert!(reason.contains("truncated"));
            }
            other => panic!("Expected UnparsableResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let classifier = LlmClassifier::new(Arc::new(FailingLlm));
        let err = classifier.classify("s", "b", None).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Llm(_)));
    }

    #[tokio::test]
    async fn low_confidence_raises_review_flag() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "general_question", "confidence": 0.5, "requires_human_review": false}"#,
        )));
        let c = classifier.classify("hi", "short", None).await.unwrap();
        assert!(c.requires_human_review);
    }

    #[tokio::test]
    async fn model_review_flag_survives_high_confidence() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "account_update", "complexity": "simple", "urgency": "low",
                "confidence": 0.95, "requires_human_review": true}"#,
        )));
        let c = classifier.classify("plate change", "new plate XYZ-987", None).await.unwrap();
        assert!(c.requires_human_review);
    }

    #[tokio::test]
    async fn custom_review_threshold_applies() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "permit_inquiry", "complexity": "simple", "urgency": "low",
                "confidence": 0.75, "requires_human_review": false}"#,
        )))
        .with_review_threshold(0.80);
        let c = classifier.classify("question", "when does my permit expire?", None).await.unwrap();
        assert!(c.requires_human_review);
    }

    #[tokio::test]
    async fn absent_optional_fields_default_conservatively() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "general_question", "confidence": 0.8}"#,
        )));
        let c = classifier.classify("s", "b", None).await.unwrap();
        assert_eq!(c.complexity, Complexity::Moderate);
        assert_eq!(c.language, Language::Other);
        assert_eq!(c.urgency, Urgency::Medium);
        assert_eq!(c.suggested_response_type, ResponseType::Manual);
        assert!(!c.requires_refund);
        assert!(c.key_entities.is_empty());
        assert!(c.notes.is_empty());
    }

    #[tokio::test]
    async fn empty_entity_strings_become_none() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "move_out", "confidence": 0.8,
                "key_entities": {"license_plate": "", "move_out_date": "  ",
                                 "property_name": "Oak Ridge", "amount": null}}"#,
        )));
        let c = classifier.classify("moving", "I am moving from Oak Ridge", None).await.unwrap();
        assert!(c.key_entities.license_plate.is_none());
        assert!(c.key_entities.move_out_date.is_none());
        assert_eq!(c.key_entities.property_name.as_deref(), Some("Oak Ridge"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(
            r#"{"intent": "permit_inquiry", "confidence": 1.8}"#,
        )));
        let c = classifier.classify("s", "b", None).await.unwrap();
        assert_eq!(c.confidence, 1.0);
    }

    // ── Usage logging ───────────────────────────────────────────────

    fn read_usage_rows(dir: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(dir.join("api_usage.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn usage_event_written_per_model_call() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Arc::new(AnalyticsLogger::new(dir.path()));
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(full_response())))
            .with_analytics(analytics);

        // The empty-input short circuit makes no call and logs nothing.
        classifier.classify("", "", Some("1001")).await.unwrap();
        classifier.classify("Refund", "body", Some("1001")).await.unwrap();

        let rows = read_usage_rows(dir.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["provider"], "mock");
        assert_eq!(rows[0]["call_type"], "classification");
        assert_eq!(rows[0]["ticket_id"], "1001");
        assert_eq!(rows[0]["prompt_tokens"], 100);
        assert_eq!(rows[0]["completion_tokens"], 50);
        assert!((rows[0]["estimated_cost_usd"].as_f64().unwrap() - 0.0002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn usage_event_without_ticket_has_null_id() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Arc::new(AnalyticsLogger::new(dir.path()));
        let classifier = LlmClassifier::new(Arc::new(MockLlm::returning(full_response())))
            .with_analytics(analytics);

        classifier.classify("Refund", "body", None).await.unwrap();

        let rows = read_usage_rows(dir.path());
        assert!(rows[0]["ticket_id"].is_null());
    }

    #[tokio::test]
    async fn failed_model_call_logs_a_failure_event() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Arc::new(AnalyticsLogger::new(dir.path()));
        let classifier = LlmClassifier::new(Arc::new(FailingLlm)).with_analytics(analytics);

        classifier.classify("s", "b", Some("1002")).await.unwrap_err();

        let rows = read_usage_rows(dir.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["success"], false);
        assert_eq!(rows[0]["ticket_id"], "1002");
        assert!(rows[0]["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert!(rows[0]["prompt_tokens"].is_null());
    }

    // ── JSON extraction ─────────────────────────────────────────────

    #[test]
    fn extract_json_direct_object() {
        let input = r#"{"intent": "unclear"}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "```json\n{\"intent\": \"unclear\"}\n```";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.contains("unclear"));
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "My analysis: {\"intent\": \"move_out\", \"confidence\": 0.7} done.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }
}
