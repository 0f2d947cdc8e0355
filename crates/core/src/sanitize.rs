//! Input sanitizer: strips markup from user-supplied text.
//!
//! Tags are removed and their text content kept. `<script>`/`<style>`
//! elements are dropped together with their contents, as are comments.
//! A lone `<` that does not start a tag (e.g. `1 < 2`) is left alone.

use regex_lite::Regex;
use std::sync::LazyLock;

static RAW_TEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>")
        .expect("invalid raw-text block regex")
});

/// An opened script/style element that never closes swallows the rest.
static UNCLOSED_RAW_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style)\b.*").expect("invalid unclosed block regex")
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").expect("invalid comment regex"));

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][^>]*(?:>|$)|<![^>]*>|<\?[^>]*>").expect("invalid tag regex")
});

/// Remove all markup from `raw`, keeping plain text. Never fails; empty
/// input yields empty output.
///
/// Passes repeat until nothing changes, since removing an inner tag can
/// join its neighbours into a new one (`<<b>script>`).
pub fn strip_markup(raw: &str) -> String {
    let mut text = raw.to_string();
    while text.contains('<') {
        let stripped = strip_once(&text);
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text
}

fn strip_once(text: &str) -> String {
    let text = RAW_TEXT_BLOCK.replace_all(text, "");
    let text = UNCLOSED_RAW_TEXT.replace_all(&text, "");
    let text = COMMENT.replace_all(&text, "");
    TAG.replace_all(&text, "").into_owned()
}
