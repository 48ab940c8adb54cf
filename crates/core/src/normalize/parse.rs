use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::book::{BookMention, PurchaseLink, Recommendation, SUMMARY_MARKER};

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:\d{1,3}[.)]|[-•])\s+)?(?:📚\s*)?\*\*(?P<title>[^*]+)\*\*\s+by\s+(?P<author>.+)$",
    )
    .expect("valid header regex")
});

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://amazon\.com/s\?k=(?:[^\s()\[\]<>"]*[^\s()\[\]<>".,;:!?])?"#)
        .expect("valid link regex")
});

static SUMMARY_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^📖\s*\**\s*what it'?s about:?\s*\**\s*").expect("valid summary regex")
});

#[derive(Default)]
struct Draft {
    title: String,
    author: String,
    description: Vec<String>,
    summary: Vec<String>,
    in_summary: bool,
}

impl Draft {
    fn finish(self, link: Option<PurchaseLink>) -> Option<Recommendation> {
        let book = BookMention::new(self.title, self.author)
            .ok()?
            .with_description(joined(&self.description))
            .with_summary(joined(&self.summary));
        Some(Recommendation { book, link })
    }
}

/// Reads a normalized reply back into structured records.
///
/// A `📚 **Title** by Author` line opens a record and a purchase link closes it. Lines between
/// are the description, except those after a `📖` label, which form the summary.
pub fn parse_recommendations(normalized: &str) -> Vec<Recommendation> {
    let mut records = Vec::new();
    let mut current: Option<Draft> = None;

    for line in normalized.lines().map(str::trim) {
        if let Some(header) = HEADER.captures(line) {
            if let Some(previous) = current.take() {
                records.extend(previous.finish(None));
            }
            current = Some(Draft {
                title: header["title"].trim().to_string(),
                author: header["author"].trim().to_string(),
                ..Draft::default()
            });
            continue;
        }

        if let Some(link) = LINK.find(line) {
            if let Some(finished) = current.take() {
                records.extend(finished.finish(Some(PurchaseLink::from_url(link.as_str()))));
            }
            continue;
        }

        let Some(draft) = current.as_mut() else {
            continue;
        };

        if line.starts_with(SUMMARY_MARKER) {
            draft.in_summary = true;
            let rest = SUMMARY_LEAD.replace(line, "");
            let rest = rest.trim_start_matches(SUMMARY_MARKER).trim();
            if !rest.is_empty() {
                draft.summary.push(rest.to_string());
            }
        } else if line.is_empty() {
            continue;
        } else if draft.in_summary {
            draft.summary.push(line.to_string());
        } else {
            draft.description.push(line.to_string());
        }
    }

    if let Some(last) = current {
        records.extend(last.finish(None));
    }
    records
}

fn joined(lines: &[String]) -> Option<String> {
    (!lines.is_empty()).then(|| lines.join(" "))
}
