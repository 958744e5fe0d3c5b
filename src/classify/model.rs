//! Classification data model.
//!
//! A `Classification` is produced once per email and is immutable after
//! creation. Downstream consumers (router, tagger, analytics) rely on every
//! schema key being present in serialized output, so none of the fields use
//! `skip_serializing_if`.

use serde::{Deserialize, Serialize};

/// Confidence below which a ticket must be reviewed by a human.
///
/// The same threshold feeds the classifier's review flag and the analytics
/// low-confidence bucket. Keep it in one place.
pub const HUMAN_REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// What the customer wants. Closed set; the classifier never emits
/// anything outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Customer explicitly wants money back.
    RefundRequest,
    /// Cancel a permit, no money-back ask.
    PermitCancellation,
    /// Update vehicle, plate, or contact details.
    AccountUpdate,
    /// Questions about permits, status, pricing, renewal.
    PermitInquiry,
    /// Billing problems, charge disputes without a refund ask.
    PaymentIssue,
    /// App or website problems.
    TechnicalIssue,
    /// Moving out notification with no other request.
    MoveOut,
    /// Anything else that is still a real question.
    GeneralQuestion,
    /// No determinable intent.
    Unclear,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::RefundRequest,
        Intent::PermitCancellation,
        Intent::AccountUpdate,
        Intent::PermitInquiry,
        Intent::PaymentIssue,
        Intent::TechnicalIssue,
        Intent::MoveOut,
        Intent::GeneralQuestion,
        Intent::Unclear,
    ];
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RefundRequest => write!(f, "refund_request"),
            Self::PermitCancellation => write!(f, "permit_cancellation"),
            Self::AccountUpdate => write!(f, "account_update"),
            Self::PermitInquiry => write!(f, "permit_inquiry"),
            Self::PaymentIssue => write!(f, "payment_issue"),
            Self::TechnicalIssue => write!(f, "technical_issue"),
            Self::MoveOut => write!(f, "move_out"),
            Self::GeneralQuestion => write!(f, "general_question"),
            Self::Unclear => write!(f, "unclear"),
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refund_request" => Ok(Self::RefundRequest),
            "permit_cancellation" => Ok(Self::PermitCancellation),
            "account_update" => Ok(Self::AccountUpdate),
            "permit_inquiry" => Ok(Self::PermitInquiry),
            "payment_issue" => Ok(Self::PaymentIssue),
            "technical_issue" => Ok(Self::TechnicalIssue),
            "move_out" => Ok(Self::MoveOut),
            "general_question" => Ok(Self::GeneralQuestion),
            "unclear" => Ok(Self::Unclear),
            _ => Err(s.to_string()),
        }
    }
}

/// How difficult the request is to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "moderate" => Ok(Self::Moderate),
            "complex" => Ok(Self::Complex),
            _ => Err(s.to_string()),
        }
    }
}

/// Detected language of the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Spanish,
    Mixed,
    Other,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::English => write!(f, "english"),
            Self::Spanish => write!(f, "spanish"),
            Self::Mixed => write!(f, "mixed"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "english" => Ok(Self::English),
            "spanish" => Ok(Self::Spanish),
            "mixed" => Ok(Self::Mixed),
            "other" => Ok(Self::Other),
            _ => Err(s.to_string()),
        }
    }
}

/// How urgent the email is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Angry customer, immediate need, legal threat.
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(s.to_string()),
        }
    }
}

/// How the ticket should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Can be fully automated.
    AutoResolve,
    /// Generate a draft for CSR approval.
    AutoDraft,
    /// Needs full human handling.
    Manual,
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoResolve => write!(f, "auto_resolve"),
            Self::AutoDraft => write!(f, "auto_draft"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for ResponseType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_resolve" => Ok(Self::AutoResolve),
            "auto_draft" => Ok(Self::AutoDraft),
            "manual" => Ok(Self::Manual),
            _ => Err(s.to_string()),
        }
    }
}

/// Structured facts pulled from the email text. Values are only set when
/// the fact is literally present, never inferred or fabricated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyEntities {
    /// License plate as written (not normalized).
    #[serde(default)]
    pub license_plate: Option<String>,
    /// Move-out date as free-form text ("March 1st", "03/01/2026", ...).
    #[serde(default)]
    pub move_out_date: Option<String>,
    /// Property or community name.
    #[serde(default)]
    pub property_name: Option<String>,
    /// Monetary amount as decimal text, no currency symbol.
    #[serde(default)]
    pub amount: Option<String>,
}

impl KeyEntities {
    pub fn is_empty(&self) -> bool {
        self.license_plate.is_none()
            && self.move_out_date.is_none()
            && self.property_name.is_none()
            && self.amount.is_none()
    }
}

/// One classified email. Created by a `Classifier`, consumed by the router
/// and the tagging/analytics collaborators, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub complexity: Complexity,
    pub language: Language,
    pub urgency: Urgency,
    /// Self-reported certainty in [0.0, 1.0], governed by the prompt rubric.
    pub confidence: f64,
    pub key_entities: KeyEntities,
    /// True iff the email expresses wanting money back, independent of the
    /// chosen intent label.
    pub requires_refund: bool,
    pub requires_human_review: bool,
    pub suggested_response_type: ResponseType,
    /// One-sentence rationale.
    pub notes: String,
}

impl Classification {
    /// The degraded result for input with nothing to classify.
    ///
    /// Empty subject + body never error; they resolve locally to `unclear`
    /// with below-band confidence and a manual-handling recommendation.
    pub fn no_signal() -> Self {
        Self {
            intent: Intent::Unclear,
            complexity: Complexity::Simple,
            language: Language::Other,
            urgency: Urgency::Low,
            confidence: 0.2,
            key_entities: KeyEntities::default(),
            requires_refund: false,
            requires_human_review: true,
            suggested_response_type: ResponseType::Manual,
            notes: "Empty subject and body; nothing to classify.".to_string(),
        }
    }

    /// Clamp confidence and enforce the human-review triggers.
    ///
    /// The model's own review flag is kept when set; the deterministic
    /// triggers (confidence below `review_threshold`, complex, high urgency)
    /// can raise the flag but never clear it.
    pub fn finalize(mut self, review_threshold: f64) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        if self.confidence < review_threshold
            || self.complexity == Complexity::Complex
            || self.urgency == Urgency::High
        {
            self.requires_human_review = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample() -> Classification {
        Classification {
            intent: Intent::RefundRequest,
            complexity: Complexity::Simple,
            language: Language::English,
            urgency: Urgency::Medium,
            confidence: 0.92,
            key_entities: KeyEntities {
                license_plate: Some("ABC-1234".to_string()),
                move_out_date: Some("March 1st".to_string()),
                property_name: None,
                amount: Some("45.00".to_string()),
            },
            requires_refund: true,
            requires_human_review: false,
            suggested_response_type: ResponseType::AutoDraft,
            notes: "Clear refund request with plate and amount.".to_string(),
        }
    }

    #[test]
    fn intent_round_trips_through_str() {
        for intent in Intent::ALL {
            let s = intent.to_string();
            assert_eq!(Intent::from_str(&s).unwrap(), intent);
        }
    }

    #[test]
    fn intent_rejects_out_of_enum_values() {
        assert_eq!(Intent::from_str("tow_issue"), Err("tow_issue".to_string()));
        assert!(Intent::from_str("REFUND_REQUEST").is_err());
        assert!(Intent::from_str("").is_err());
    }

    #[test]
    fn serialized_output_uses_snake_case_labels() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["intent"], "refund_request");
        assert_eq!(json["complexity"], "simple");
        assert_eq!(json["language"], "english");
        assert_eq!(json["urgency"], "medium");
        assert_eq!(json["suggested_response_type"], "auto_draft");
    }

    #[test]
    fn absent_entities_serialize_as_null_keys() {
        let mut c = sample();
        c.key_entities = KeyEntities::default();
        let json = serde_json::to_value(&c).unwrap();
        let entities = json["key_entities"].as_object().unwrap();

        // Keys must exist even when the value is absent.
        for key in ["license_plate", "move_out_date", "property_name", "amount"] {
            assert!(entities.contains_key(key), "missing key '{key}'");
            assert!(entities[key].is_null());
        }
    }

    #[test]
    fn all_schema_keys_always_present() {
        let json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "intent",
            "complexity",
            "language",
            "urgency",
            "confidence",
            "key_entities",
            "requires_refund",
            "requires_human_review",
            "suggested_response_type",
            "notes",
        ] {
            assert!(obj.contains_key(key), "missing key '{key}'");
        }
    }

    #[test]
    fn finalize_clamps_confidence() {
        let mut c = sample();
        c.confidence = 1.4;
        let c = c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD);
        assert_eq!(c.confidence, 1.0);

        let mut c = sample();
        c.confidence = -0.2;
        let c = c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn finalize_flags_low_confidence() {
        let mut c = sample();
        c.confidence = 0.55;
        c.requires_human_review = false;
        let c = c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD);
        assert!(c.requires_human_review);
    }

    #[test]
    fn finalize_flags_complex_and_high_urgency() {
        let mut c = sample();
        c.complexity = Complexity::Complex;
        c.requires_human_review = false;
        assert!(c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD).requires_human_review);

        let mut c = sample();
        c.urgency = Urgency::High;
        c.requires_human_review = false;
        assert!(c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD).requires_human_review);
    }

    #[test]
    fn finalize_never_clears_model_review_flag() {
        // High confidence, simple, medium urgency: no deterministic trigger,
        // but the model asked for review anyway.
        let mut c = sample();
        c.confidence = 0.95;
        c.requires_human_review = true;
        let c = c.finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD);
        assert!(c.requires_human_review);
    }

    #[test]
    fn finalize_leaves_confident_simple_tickets_unflagged() {
        let c = sample().finalize(HUMAN_REVIEW_CONFIDENCE_THRESHOLD);
        assert!(!c.requires_human_review);
    }

    #[test]
    fn no_signal_is_unclear_below_all_bands() {
        let c = Classification::no_signal();
        assert_eq!(c.intent, Intent::Unclear);
        assert!(c.confidence < 0.40);
        assert!(c.requires_human_review);
        assert_eq!(c.suggested_response_type, ResponseType::Manual);
        assert!(c.key_entities.is_empty());
    }
}
