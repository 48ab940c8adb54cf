use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::extract::extract_and_link;
use super::links::repair_links_with;
use super::NormalizerSettings;
use crate::errors::DomainError;

static BLANK_LINE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid blank line regex"));

static DEFAULT_NORMALIZER: Lazy<ResponseNormalizer> = Lazy::new(ResponseNormalizer::default);

/// Normalizes one raw reply with the default settings.
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

/// Cleanup, link repair, and link backstop for one agent reply.
///
/// Holds only compiled patterns and settings, so a single instance can be shared between
/// concurrent chat sessions.
#[derive(Clone, Debug)]
pub struct ResponseNormalizer {
    settings: NormalizerSettings,
    stray_line_label: Option<Regex>,
    stray_inline_label: Option<Regex>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(NormalizerSettings::default()).expect("default stray labels compile")
    }
}

impl ResponseNormalizer {
    pub fn new(settings: NormalizerSettings) -> Result<Self, DomainError> {
        let alternatives = settings
            .stray_labels
            .iter()
            .filter(|label| !label.trim().is_empty())
            .map(|label| regex::escape(label.trim()))
            .collect::<Vec<_>>();

        let (stray_line_label, stray_inline_label) = if alternatives.is_empty() {
            (None, None)
        } else {
            let labels = alternatives.join("|");
            let line = compile_label_pattern(&format!(r"\n\s*(?:{labels})\s*"))?;
            let inline = compile_label_pattern(&format!(r"\s+(?:{labels})\s*"))?;
            (Some(line), Some(inline))
        };

        Ok(Self { settings, stray_line_label, stray_inline_label })
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.settings
    }

    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = self.clean(raw);
        let repaired = repair_links_with(
            &cleaned,
            self.settings.malformed_link_threshold,
            self.settings.context_window,
        );
        let linked = extract_and_link(&repaired);

        debug!(
            event_name = "normalize.completed",
            raw_len = raw.len(),
            normalized_len = linked.len(),
            "agent reply normalized"
        );
        linked
    }

    /// Steps before link handling: trim, leading label, stray labels, blank line runs.
    pub fn clean(&self, raw: &str) -> String {
        let trimmed = self.strip_leading_label(raw.trim());

        let mut text = trimmed.to_string();
        if let Some(pattern) = &self.stray_line_label {
            text = pattern.replace_all(&text, "\n").into_owned();
        }
        if let Some(pattern) = &self.stray_inline_label {
            text = pattern.replace_all(&text, " ").into_owned();
        }

        BLANK_LINE_RUN.replace_all(&text, "\n\n").trim().to_string()
    }

    fn strip_leading_label<'a>(&self, text: &'a str) -> &'a str {
        self.settings
            .role_labels
            .iter()
            .filter(|label| !label.is_empty())
            .find_map(|label| text.strip_prefix(label.as_str()))
            .map(str::trim)
            .unwrap_or(text)
    }
}

fn compile_label_pattern(pattern: &str) -> Result<Regex, DomainError> {
    Regex::new(pattern).map_err(|error| {
        DomainError::InvariantViolation(format!(
            "stray label pattern `{pattern}` is invalid: {error}"
        ))
    })
}
