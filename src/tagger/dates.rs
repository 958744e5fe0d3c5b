//! Move-out date normalization.
//!
//! Customers write dates every way imaginable and the model extracts them
//! verbatim, but the desk platform's date field only accepts `YYYY-MM-DD`.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})(st|nd|rd|th)\b").unwrap());

/// Formats tried in order after ordinal suffixes are stripped.
const DATE_FORMATS: [&str; 5] = [
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
];

/// Normalize free-form date text to `YYYY-MM-DD`.
///
/// Returns None when the text doesn't parse; never guesses.
pub fn normalize_move_out_date(raw: &str) -> Option<String> {
    let cleaned = ORDINAL_RE.replace_all(raw.trim(), "$1");
    if cleaned.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_month_name() {
        assert_eq!(
            normalize_move_out_date("January 1, 2026").as_deref(),
            Some("2026-01-01")
        );
    }

    #[test]
    fn ordinal_suffixes_are_stripped() {
        assert_eq!(
            normalize_move_out_date("January 1st, 2026").as_deref(),
            Some("2026-01-01")
        );
        assert_eq!(
            normalize_move_out_date("February 2nd, 2026").as_deref(),
            Some("2026-02-02")
        );
        assert_eq!(
            normalize_move_out_date("March 3rd, 2026").as_deref(),
            Some("2026-03-03")
        );
        assert_eq!(
            normalize_move_out_date("April 15th, 2026").as_deref(),
            Some("2026-04-15")
        );
    }

    #[test]
    fn abbreviated_month() {
        assert_eq!(
            normalize_move_out_date("Jan 1, 2026").as_deref(),
            Some("2026-01-01")
        );
    }

    #[test]
    fn slash_format_is_month_first() {
        assert_eq!(
            normalize_move_out_date("01/15/2026").as_deref(),
            Some("2026-01-15")
        );
    }

    #[test]
    fn iso_passthrough() {
        assert_eq!(
            normalize_move_out_date("2026-01-01").as_deref(),
            Some("2026-01-01")
        );
    }

    #[test]
    fn dash_format_is_day_first() {
        assert_eq!(
            normalize_move_out_date("15-01-2026").as_deref(),
            Some("2026-01-15")
        );
    }

    #[test]
    fn end_of_year() {
        assert_eq!(
            normalize_move_out_date("December 31st, 2025").as_deref(),
            Some("2025-12-31")
        );
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert_eq!(normalize_move_out_date("next month"), None);
        assert_eq!(normalize_move_out_date("asdfghjkl"), None);
        assert_eq!(normalize_move_out_date(""), None);
    }
}
