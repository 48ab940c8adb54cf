//! Response normalization pipeline.
//!
//! Raw agent replies go through four stages, always in this order:
//! 1. **Cleanup** (`response`) - trim, drop role labels, collapse blank lines
//! 2. **Link repair** (`links`) - rebuild over-long purchase URLs from nearby headers
//! 3. **Backstop extraction** (`extract`) - add purchase links when the agent sent none
//! 4. **Parsing** (`parse`, optional) - read the normalized text back into records
//!
//! Every stage is a total function over `&str`. When a heuristic cannot find what it is
//! looking for, the input is passed through unchanged.

pub mod extract;
pub mod links;
pub mod parse;
pub mod response;
pub mod url;

use once_cell::sync::Lazy;
use regex::Regex;

pub use extract::extract_and_link;
pub use links::{repair_links, repair_links_with};
pub use parse::parse_recommendations;
pub use response::{normalize, ResponseNormalizer};
pub use url::{build_url, PURCHASE_URL_PREFIX};

pub const DEFAULT_MALFORMED_LINK_THRESHOLD: usize = 80;
pub const DEFAULT_CONTEXT_WINDOW: usize = 300;
pub const DEFAULT_ROLE_LABELS: &[&str] =
    &["Bot:", "Assistant:", "AI:", "BookBuddy:", "Human:", "User:"];
pub const DEFAULT_STRAY_LABELS: &[&str] = &["Bot:"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizerSettings {
    /// Purchase URLs at or above this many characters are treated as malformed.
    pub malformed_link_threshold: usize,
    /// Characters of preceding text searched for a book header when repairing a link.
    pub context_window: usize,
    /// Leading labels, checked in order; only the first match is removed.
    pub role_labels: Vec<String>,
    /// Labels the model tends to repeat mid-reply.
    pub stray_labels: Vec<String>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            malformed_link_threshold: DEFAULT_MALFORMED_LINK_THRESHOLD,
            context_window: DEFAULT_CONTEXT_WINDOW,
            role_labels: DEFAULT_ROLE_LABELS.iter().map(|label| (*label).to_string()).collect(),
            stray_labels: DEFAULT_STRAY_LABELS.iter().map(|label| (*label).to_string()).collect(),
        }
    }
}

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}[.)]|[-*•])\s+").expect("valid list marker regex"));

const ARTIFACT_CHARS: &[char] =
    &['"', '\'', '“', '”', '‘', '’', '*', '_', '`', '-', '–', '—', '📚', '📖', '🛒'];

/// Trims whitespace, quotes, markdown emphasis, dashes, and a leading list enumerator.
pub(crate) fn clean_field(value: &str) -> String {
    let trimmed = trim_artifacts(value);
    let without_marker = LIST_MARKER.replace(trimmed, "");
    trim_artifacts(&without_marker).to_string()
}

/// Cuts an author field at a spaced dash or a buy label so trailing text does not leak
/// into URLs.
pub(crate) fn clean_author(value: &str) -> String {
    let author = [" - ", " – ", " — ", "🛒", " Buy:"]
        .iter()
        .filter_map(|separator| value.find(separator))
        .min()
        .map(|index| &value[..index])
        .unwrap_or(value);
    clean_field(author)
}

fn trim_artifacts(value: &str) -> &str {
    value.trim_matches(|character: char| {
        character.is_whitespace() || ARTIFACT_CHARS.contains(&character)
    })
}
