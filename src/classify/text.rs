//! Plain-text preparation for ticket descriptions.
//!
//! Help-desk webhooks deliver descriptions as HTML fragments. The classifier
//! wants prose, so tags go first, then the handful of entities desk HTML
//! actually produces, then whitespace is collapsed.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce an HTML fragment to plain text.
///
/// Tags become spaces so adjacent block elements do not fuse into one word.
/// Plain-text input passes through with only whitespace normalization.
pub fn strip_html(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}
