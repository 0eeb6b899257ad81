//! Utility functions and helpers.

pub mod http;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[,\r\n]+").expect("static separator pattern"))
}

/// Split free-form keyword input (comma or newline separated).
///
/// Entries are trimmed, empties dropped and duplicates removed
/// case-insensitively, keeping the first spelling and the input order.
pub fn parse_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    separator()
        .split(text)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Normalize an already-split keyword list with the same rules as
/// [`parse_keywords`].
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .filter_map(|k| {
            let k = k.as_ref().trim();
            (!k.is_empty() && seen.insert(k.to_lowercase())).then(|| k.to_string())
        })
        .collect()
}

/// Key used to treat two titles as the same product.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}
