//! Analytics: JSONL event logs plus dashboard-ready aggregation.
//!
//! `logger` appends events as tickets flow through the pipeline;
//! `aggregator` reads the logs back and computes report JSON for the
//! analytics endpoints. Aggregation is read-only and tolerant of partial
//! or corrupt lines, so a damaged log degrades reports instead of
//! breaking them.

pub mod aggregator;
pub mod logger;

pub use aggregator::Aggregator;
pub use logger::{AnalyticsLogger, ApiUsageEvent, ClassificationEvent};

/// Round to a fixed number of decimal places for report output.
pub(crate) fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
