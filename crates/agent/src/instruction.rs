use std::fs;
use std::path::Path;

use bookbuddy_core::errors::ApplicationError;

/// Instruction sent with every invocation unless `[agent] instruction_path` overrides it.
///
/// The header, summary, and link formats here are what the response normalizer expects to
/// find, so edits must keep them intact.
pub const DEFAULT_INSTRUCTION: &str = r#"You are BookBuddy. Your ONLY job is to recommend specific books with purchase links.

CRITICAL RULES:
1. When someone asks for books, immediately recommend 2-3 specific books
2. ALWAYS include: Book Title, Author, brief description, and Amazon purchase link
3. If user requests summaries, include a brief plot/content summary for each book
4. Do NOT ask questions back - just give book recommendations
5. IMPORTANT: Amazon links must ONLY contain book title and author
   Format: https://amazon.com/s?k=TITLE+AUTHOR (replace spaces with +)
   Example: https://amazon.com/s?k=Atomic+Habits+James+Clear
   Do NOT include any other text in the URL

EXAMPLE FORMAT:
User: "motivational books"
You: "Here are great motivational books:

📚 **Think and Grow Rich** by Napoleon Hill
Classic success mindset book with timeless principles
🛒 Buy: https://amazon.com/s?k=Think+and+Grow+Rich+Napoleon+Hill

📚 **The Power of Now** by Eckhart Tolle
Mindfulness and present-moment awareness guide
🛒 Buy: https://amazon.com/s?k=The+Power+of+Now+Eckhart+Tolle"

SUMMARY FORMAT (when requested):
📚 **[TITLE]** by [AUTHOR]
[Brief description]

📖 **What it's about:**
[2-3 sentences about the book's plot, main themes, or key content]

🛒 Buy: https://amazon.com/s?k=[TITLE]+[AUTHOR]

EXAMPLE WITH SUMMARY:
📚 **The Alchemist** by Paulo Coelho
Inspirational novel about following your dreams

📖 **What it's about:**
A young shepherd boy travels from Spain to Egypt in search of treasure, learning that the real treasure lies in following one's personal legend and listening to one's heart.

🛒 Buy: https://amazon.com/s?k=The+Alchemist+Paulo+Coelho

You are BookBuddy. Just recommend books with purchase links."#;

pub const SUMMARY_INSTRUCTION: &str = "IMPORTANT: For each book, after the description, add a section that starts with '📖 What it's about:' followed by 2-3 sentences explaining the book's main content, plot, or key themes.";

const SUMMARY_SUFFIXES: &[&str] = &[" with summary", " summary"];

/// Reads the instruction override if one is configured.
pub fn load_instruction(path: Option<&Path>) -> Result<String, ApplicationError> {
    let Some(path) = path else {
        return Ok(DEFAULT_INSTRUCTION.to_string());
    };

    let instruction = fs::read_to_string(path).map_err(|error| {
        ApplicationError::Configuration(format!(
            "could not read agent instruction `{}`: {error}",
            path.display()
        ))
    })?;
    if instruction.trim().is_empty() {
        return Err(ApplicationError::Configuration(format!(
            "agent instruction `{}` is empty",
            path.display()
        )));
    }
    Ok(instruction)
}

/// Appends the summary request to a user query.
pub fn with_summary_request(input: &str) -> String {
    let input = input.trim().trim_end_matches('.');
    format!("{input}. {SUMMARY_INSTRUCTION}")
}

/// A line typed in the interactive chat, with a trailing summary request split off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryRequest {
    pub query: String,
    pub include_summary: bool,
}

impl SummaryRequest {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lowered = trimmed.to_lowercase();

        // Suffixes are ASCII, so the byte offset in the lowercased copy is valid in `trimmed`.
        let stripped = SUMMARY_SUFFIXES.iter().find_map(|suffix| {
            lowered.ends_with(suffix).then(|| trimmed[..trimmed.len() - suffix.len()].trim_end())
        });

        match stripped {
            Some(query) => Self { query: query.to_string(), include_summary: true },
            None => Self { query: trimmed.to_string(), include_summary: false },
        }
    }
}
