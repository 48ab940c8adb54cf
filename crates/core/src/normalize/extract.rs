use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use super::{clean_author, clean_field};
use crate::domain::book::{BookMention, BOOK_MARKER, SUMMARY_MARKER};

/// `[📚] [**]Title[**] by Author [- description]` terminated by a line break or end of text.
/// Every separator is horizontal whitespace so an entry never spills into the next line.
static BOOK_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:📚[ \t]*)?(\*{0,2})([^*\n]+?)(\*{0,2})[ \t]+by[ \t]+([^-–\n]+?)(?:[ \t]*[-–][ \t]*([^\n]+?))?(?:\n|$)",
    )
    .expect("valid book entry regex")
});

/// Adds purchase links to book entries when the reply carries none at all.
pub fn extract_and_link(text: &str) -> String {
    if text.to_lowercase().contains("amazon.com") {
        return text.to_string();
    }

    let summaries = summary_spans(text);
    let mut linked = 0usize;
    let output = BOOK_ENTRY
        .replace_all(text, |captures: &Captures<'_>| {
            let Some(whole) = captures.get(0) else {
                return String::new();
            };
            if summaries.iter().any(|span| span.contains(&whole.start())) {
                return whole.as_str().to_string();
            }
            match render_entry(captures) {
                Some(block) => {
                    linked += 1;
                    block
                }
                None => whole.as_str().to_string(),
            }
        })
        .into_owned();

    if linked > 0 {
        debug!(
            event_name = "normalize.links_synthesized",
            book_count = linked,
            "added purchase links to unlinked book entries"
        );
    }
    output
}

/// Byte ranges of summary blocks: a `📖` line and the non-blank lines after it, up to the
/// next header.
fn summary_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim();
        let content = trimmed.trim_start_matches('*').trim_start();
        let ends_block =
            content.is_empty() || content.starts_with(BOOK_MARKER) || trimmed.starts_with("**");

        if content.starts_with(SUMMARY_MARKER) {
            open.get_or_insert(start);
        } else if ends_block {
            if let Some(begin) = open.take() {
                spans.push(begin..start);
            }
        }
    }
    if let Some(begin) = open {
        spans.push(begin..offset);
    }
    spans
}

fn render_entry(captures: &Captures<'_>) -> Option<String> {
    let whole = captures.get(0)?.as_str();
    let title = clean_field(captures.get(2)?.as_str());
    let author = clean_author(captures.get(4)?.as_str());
    let description = captures.get(5).map(|value| clean_field(value.as_str()));

    let book = BookMention::new(title, author).ok()?.with_description(description);
    let mut block = book.render(&book.purchase_link());
    if whole.ends_with('\n') {
        block.push('\n');
    }
    Some(block)
}
