use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use super::url::build_url;
use super::{clean_author, clean_field, DEFAULT_CONTEXT_WINDOW, DEFAULT_MALFORMED_LINK_THRESHOLD};

/// Stops before closing brackets and never ends on sentence punctuation, so markdown
/// `[Buy](url)` and `url.` keep their delimiters when the link is rebuilt.
static PURCHASE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://amazon\.com/s\?k=(?:[^\s()\[\]<>"]*[^\s()\[\]<>".,;:!?])?"#)
        .expect("valid purchase url regex")
});

/// Header shapes searched before a malformed link, highest priority first.
static CONTEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)📚\s*\*\*(.*?)\*\*\s*by\s*(.*?)(?:\n|$)",
        r#"(?i)book\s+"([^"]+)"\s*by\s*([^\n]+)"#,
        r"(?i)\*\*([^*\n]+)\*\*\s+by\s+([^\n]+)",
        r#"(?i)"([^"\n]+)"\s+by\s+([^\n]+)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid context pattern"))
    .collect()
});

pub fn repair_links(text: &str) -> String {
    repair_links_with(text, DEFAULT_MALFORMED_LINK_THRESHOLD, DEFAULT_CONTEXT_WINDOW)
}

/// Rebuilds purchase URLs whose length reaches `threshold` from a book header found in the
/// `context_window` characters before them. Every match is resolved against `text` as given.
pub fn repair_links_with(text: &str, threshold: usize, context_window: usize) -> String {
    PURCHASE_URL
        .replace_all(text, |captures: &Captures<'_>| {
            let Some(found) = captures.get(0) else {
                return String::new();
            };
            let url = found.as_str();
            if url.chars().count() < threshold {
                return url.to_string();
            }

            let context = preceding_window(text, found.start(), context_window);
            match book_from_context(context) {
                Some((title, author)) => {
                    let repaired = build_url(&title, &author);
                    debug!(
                        event_name = "normalize.link_repaired",
                        original_len = url.len(),
                        repaired_len = repaired.len(),
                        "rebuilt malformed purchase link from context"
                    );
                    repaired
                }
                None => {
                    debug!(
                        event_name = "normalize.link_unrepaired",
                        original_len = url.len(),
                        "no book header near malformed purchase link"
                    );
                    url.to_string()
                }
            }
        })
        .into_owned()
}

fn book_from_context(context: &str) -> Option<(String, String)> {
    CONTEXT_PATTERNS.iter().find_map(|pattern| {
        let nearest = pattern.captures_iter(context).last()?;
        let title = clean_field(nearest.get(1)?.as_str());
        let author = clean_author(nearest.get(2)?.as_str());
        (!title.is_empty() && !author.is_empty()).then_some((title, author))
    })
}

/// Returns at most `window` characters of `text` ending at byte offset `end`.
fn preceding_window(text: &str, end: usize, window: usize) -> &str {
    let before = &text[..end];
    if window == 0 {
        return "";
    }
    let start =
        before.char_indices().rev().nth(window - 1).map(|(index, _)| index).unwrap_or(0);
    &before[start..]
}
