use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::normalize::url::build_url;

/// Emoji that opens every rendered book header.
pub const BOOK_MARKER: &str = "📚";
/// Emoji that introduces a summary section.
pub const SUMMARY_MARKER: &str = "📖";
pub const SUMMARY_LABEL: &str = "📖 **What it's about:**";
pub const BUY_LABEL: &str = "Buy:";

/// A book referenced in one agent reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMention {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub summary: Option<String>,
}

impl BookMention {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Result<Self, DomainError> {
        let title = title.into().trim().to_string();
        let author = author.into().trim().to_string();

        if title.is_empty() {
            return Err(DomainError::InvariantViolation("book title must not be empty".to_string()));
        }
        if author.is_empty() {
            return Err(DomainError::InvariantViolation(
                "book author must not be empty".to_string(),
            ));
        }

        Ok(Self { title, author, description: None, summary: None })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = non_blank(description);
        self
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = non_blank(summary);
        self
    }

    pub fn purchase_link(&self) -> PurchaseLink {
        PurchaseLink::for_book(&self.title, &self.author)
    }

    pub fn header(&self) -> String {
        format!("{BOOK_MARKER} **{}** by {}", self.title, self.author)
    }

    /// Renders the header, optional description, and buy line as a newline-joined block.
    pub fn render(&self, link: &PurchaseLink) -> String {
        let mut lines = vec![self.header()];
        if let Some(description) = &self.description {
            lines.push(description.clone());
        }
        if let Some(summary) = &self.summary {
            lines.push(SUMMARY_LABEL.to_string());
            lines.push(summary.clone());
        }
        lines.push(format!("{BUY_LABEL} {}", link.url));
        lines.join("\n")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseLink {
    pub url: String,
}

impl PurchaseLink {
    pub fn for_book(title: &str, author: &str) -> Self {
        Self { url: build_url(title, author) }
    }

    /// Wraps a URL taken verbatim from agent output.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn query(&self) -> &str {
        self.url.split_once("?k=").map(|(_, query)| query).unwrap_or("")
    }
}

/// One structured entry parsed out of a normalized reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub book: BookMention,
    pub link: Option<PurchaseLink>,
}
