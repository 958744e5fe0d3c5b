//! Email classification core.
//!
//! Split in four:
//! - `model`: the `Classification` record and its closed enums
//! - `prompt`: the instruction template encoding the decision policy
//! - `engine`: the `Classifier` trait and the LLM-backed implementation
//! - `text`: HTML-to-prose preparation for ticket descriptions
//!
//! The engine is stateless and safe to call concurrently; rate limiting
//! and retries are the caller's job.

pub mod engine;
pub mod model;
pub mod prompt;
pub mod text;

pub use engine::{Classifier, LlmClassifier};
pub use model::{
    Classification, Complexity, Intent, KeyEntities, Language, ResponseType, Urgency,
    HUMAN_REVIEW_CONFIDENCE_THRESHOLD,
};
pub use text::strip_html;
