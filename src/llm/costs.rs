//! Per-token pricing for API cost estimation.
//!
//! Prices are USD per single token (vendor list prices divided by 1M).
//! Unknown models cost zero rather than a guess, so dashboards show a
//! gap instead of a fabricated number when a new model ships.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD per token for a model.
pub fn cost_per_token(model: &str) -> (Decimal, Decimal) {
    if model.starts_with("gpt-4o-mini") {
        (dec!(0.00000015), dec!(0.0000006))
    } else if model.starts_with("gpt-4o") {
        (dec!(0.0000025), dec!(0.00001))
    } else if model.starts_with("gpt-4.1-mini") {
        (dec!(0.0000004), dec!(0.0000016))
    } else if model.starts_with("gpt-4.1") {
        (dec!(0.000002), dec!(0.000008))
    } else if model.starts_with("claude-3-5-haiku") {
        (dec!(0.0000008), dec!(0.000004))
    } else if model.starts_with("claude-3-5-sonnet") || model.starts_with("claude-sonnet") {
        (dec!(0.000003), dec!(0.000015))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}
