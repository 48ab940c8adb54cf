/// Fixed retailer search prefix shared with the agent instruction.
pub const PURCHASE_URL_PREFIX: &str = "https://amazon.com/s?k=";

const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '‘', '’'];

pub fn build_url(title: &str, author: &str) -> String {
    let combined = format!("{} {}", strip_quotes(title), strip_quotes(author));

    let filtered = combined
        .chars()
        .filter(|character| character.is_ascii_alphanumeric() || character.is_whitespace())
        .collect::<String>();

    // split_whitespace drops empty runs, so joining never yields `++` or edge `+`.
    let query = filtered.split_whitespace().collect::<Vec<_>>().join("+");

    format!("{PURCHASE_URL_PREFIX}{query}")
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|character: char| {
        character.is_whitespace() || QUOTE_CHARS.contains(&character)
    })
}
