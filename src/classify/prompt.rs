//! Prompt templates for email classification.
//!
//! The system prompt carries the whole decision policy: the intent taxonomy
//! with its priority rules plus the confidence rubric. Changing wording here
//! changes classification behavior in production.

use crate::classify::model::HUMAN_REVIEW_CONFIDENCE_THRESHOLD;

/// Longest email body forwarded to the model, in chars (token control).
const BODY_PROMPT_MAX_CHARS: usize = 6_000;

/// Build the classification system prompt.
pub fn build_classify_system_prompt() -> String {
    let mut prompt = String::with_capacity(4_096);

    prompt.push_str(
        "You are an expert customer support email classifier for ParkM, a virtual \
         parking permit provider. Analyze support emails and classify them accurately \
         to help route them to the right team and set expectations.\n\n",
    );

    prompt.push_str(
        "1. \"intent\" - Primary intent (choose ONE):\n\
         - \"refund_request\" - Customer explicitly requesting money back\n\
         - \"permit_cancellation\" - Customer wants a permit cancelled, no refund mentioned\n\
         - \"account_update\" - Update vehicle info, license plate, contact details\n\
         - \"permit_inquiry\" - Questions about permits, status, pricing, renewal\n\
         - \"payment_issue\" - Billing problems, charge disputes\n\
         - \"technical_issue\" - App/website problems\n\
         - \"move_out\" - Moving out notification\n\
         - \"general_question\" - Other questions\n\
         - \"unclear\" - Cannot determine intent\n\n",
    );

    prompt.push_str(
        "PRIORITY RULES for intent (apply in order, first match wins):\n\
         - Email mentions moving out AND explicitly asks for money back -> \"refund_request\" \
         (the refund ask dominates the move-out framing).\n\
         - Email asks to cancel a permit but does NOT mention wanting money back -> \
         \"permit_cancellation\".\n\
         - Email only announces moving out, with no other action requested -> \"move_out\".\n\
         - Email disputes a charge AND explicitly asks for money back -> \"refund_request\"; \
         disputes a charge WITHOUT asking for money back -> \"payment_issue\".\n\
         - Renewal or expiration mentions without an explicit refund ask are NEVER \
         \"refund_request\"; default those to \"permit_inquiry\".\n\
         - Completely empty subject and body -> \"unclear\".\n\n",
    );

    prompt.push_str(
        "2. \"complexity\" - How difficult to resolve (choose ONE):\n\
         - \"simple\" - Clear request, straightforward resolution, one permit/vehicle\n\
         - \"moderate\" - Some ambiguity, may need follow-up, multiple items\n\
         - \"complex\" - Unclear request, multiple issues, edge cases, conflicts\n\n\
         3. \"language\" - Detected language: \"english\", \"spanish\", \"mixed\", or \"other\"\n\n\
         4. \"urgency\" - How urgent (choose ONE):\n\
         - \"high\" - Angry customer, immediate need, legal threat\n\
         - \"medium\" - Normal request timing\n\
         - \"low\" - General inquiry, no rush\n\n",
    );

    prompt.push_str(
        "5. \"confidence\" - Your confidence in this classification (0.0 to 1.0).\n\
         Score it with this rubric:\n\
         - 0.90-1.00: intent unambiguous AND all relevant entities present\n\
         - 0.75-0.89: intent clear but one or more expected entities missing\n\
         - 0.60-0.74: genuinely ambiguous between two or more plausible intents\n\
         - 0.40-0.59: rambling, contradictory, or very short text\n\
         - below 0.40: no determinable signal at all (empty or off-topic)\n\
         Then apply ALL matching adjustments, cumulatively:\n\
         - empty or near-empty body: cap confidence at 0.55 regardless of other signals\n\
         - forwarded or reply-chain noise in the body: subtract 0.10\n\
         - multiple equally plausible intents: cap at 0.70\n\
         - an expected license plate is missing: subtract 0.05\n\
         - an expected move-out date is missing: subtract 0.05\n\
         - someone writing on behalf of somebody else: subtract 0.05\n\
         The final value must stay within 0.0 to 1.0.\n\n",
    );

    prompt.push_str(
        "6. \"key_entities\" - Extract important information as an object:\n\
         - \"license_plate\": null or the plate exactly as written\n\
         - \"move_out_date\": null or the date text as written (do not reformat)\n\
         - \"property_name\": null or property/community name\n\
         - \"amount\": null or the amount as decimal text without a currency symbol\n\
         Only extract values literally present in the text. Never guess or fabricate; \
         when a value is not stated, use null.\n\n",
    );

    prompt.push_str(&format!(
        "7. \"requires_refund\" - Boolean: does this email express wanting money back? \
         Judge the content, not the intent label you chose.\n\n\
         8. \"requires_human_review\" - Boolean: should a human review this before any \
         automation? Set true when confidence is below {HUMAN_REVIEW_CONFIDENCE_THRESHOLD}, \
         complexity is \"complex\", or urgency is \"high\".\n\n\
         9. \"suggested_response_type\" - How should we respond:\n\
         - \"auto_resolve\" - Can be fully automated\n\
         - \"auto_draft\" - Generate draft for CSR approval\n\
         - \"manual\" - Needs full human handling\n\n\
         10. \"notes\" - Brief explanation of your classification (1 sentence)\n\n",
    ));

    prompt.push_str(
        "Respond ONLY with valid JSON containing exactly the ten fields above, no other \
         text. Include every key even when its value is null.",
    );

    prompt
}

/// Build the per-email user prompt.
pub fn build_classify_user_prompt(subject: &str, body: &str) -> String {
    let mut prompt = String::with_capacity(512 + body.len().min(BODY_PROMPT_MAX_CHARS));

    prompt.push_str("Analyze this customer support email and classify it.\n\n");
    prompt.push_str("EMAIL:\n");
    prompt.push_str(&format!("Subject: {}\n", subject));

    let body_preview: String = body.chars().take(BODY_PROMPT_MAX_CHARS).collect();
    prompt.push_str(&format!("Body: {}", body_preview));

    prompt
}
